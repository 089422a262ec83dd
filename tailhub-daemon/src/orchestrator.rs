//! Daemon orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `tailhub-daemon`.
//! It validates configuration, compiles the criteria and alert rules,
//! spawns every task, and shuts them down on a signal.
//!
//! # Startup Order (consumers before producers)
//!
//! 1. Hub (if the dashboard is enabled)
//! 2. Log pipeline consumer loop and alert logger
//! 3. Dashboard HTTP server
//! 4. Backfill, one source at a time
//! 5. File tailers (a source whose watch fails is disabled, the rest run)
//!
//! # Shutdown
//!
//! One [`CancellationToken`] is shared by every task. Cancelling it closes
//! file descriptors and watches, ends the consumer loop, closes live stream
//! subscribers and stops the HTTP server. Tasks are awaited with a timeout.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tailhub_core::config::TailhubConfig;
use tailhub_log_pipeline::{
    AlertEvaluator, Criteria, CriteriaInputs, EventStore, FileTailer, Hub, LogPipelineBuilder,
    LogPipelineError, Match, NotifySource, backfill,
};

use crate::dashboard::{self, DashboardState};
use crate::metrics_server;

/// Upper bound on waiting for tasks after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sources with a running tailer
    pub tailed_sources: Vec<String>,
    /// Sources whose tailer failed to start
    pub disabled_sources: Vec<String>,
    /// Lines sent by backfill across all sources
    pub backfilled_lines: usize,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: TailhubConfig,
    criteria: Criteria,
    alerts: Arc<AlertEvaluator>,
    /// Replay store, kept only while the dashboard can read it
    store: Option<Arc<EventStore>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or validated,
    /// or if the criteria or an alert rule fail to compile.
    pub async fn build(config_path: &Path, inputs: &CriteriaInputs) -> Result<Self> {
        let config = TailhubConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config, inputs)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: TailhubConfig, inputs: &CriteriaInputs) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let criteria = Criteria::from_inputs(inputs)
            .map_err(|e| anyhow::anyhow!("invalid filter: {}", e))?;
        let alerts = AlertEvaluator::new(&config.alerts)
            .map_err(|e| anyhow::anyhow!("invalid alert rules: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            metrics_server::record_build_info();
        }

        tracing::info!(
            sources = config.sources.len(),
            alert_rules = alerts.rule_count(),
            filtered = !criteria.is_empty(),
            "orchestrator initialized"
        );

        Ok(Self {
            store: config
                .dashboard
                .enabled
                .then(|| Arc::new(EventStore::from_config(&config.store))),
            config,
            criteria,
            alerts: Arc::new(alerts),
            cancel: CancellationToken::new(),
        })
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<RunSummary> {
        self.run_until(async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Starts every task, waits for `shutdown`, then stops them.
    ///
    /// Returns immediately when no sources are configured.
    pub async fn run_until<F>(self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut summary = RunSummary::default();
        if self.config.sources.is_empty() {
            tracing::warn!("no sources configured, nothing to tail");
            return Ok(summary);
        }
        for source in &self.config.sources {
            tracing::info!(
                source = %source.name,
                path = %source.path,
                format = %source.format,
                "configured source"
            );
        }

        let cancel = self.cancel.clone();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // 1. hub
        let hub = if self.store.is_some() {
            let (hub, handle) = Hub::new(
                self.config.dashboard.hub_queue_capacity,
                self.config.dashboard.subscriber_buffer,
            );
            tasks.push(tokio::spawn(hub.run(cancel.clone())));
            Some(handle)
        } else {
            None
        };

        // 2. pipeline + alert logger
        let mut builder = LogPipelineBuilder::new()
            .sources(&self.config.sources)
            .ingest(self.config.ingest.clone())
            .criteria(self.criteria)
            .alerts(Arc::clone(&self.alerts));
        if let (Some(handle), Some(store)) = (&hub, &self.store) {
            builder = builder.hub(handle.clone()).store(Arc::clone(store));
        }
        let (pipeline, alert_rx) = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;
        let lines = pipeline.line_sender();
        let errors = pipeline.error_sender();
        let pipeline_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            pipeline.run(pipeline_cancel).await;
        }));
        if let Some(alert_rx) = alert_rx {
            tasks.push(spawn_alert_logger(alert_rx, cancel.clone()));
        }

        // 3. dashboard
        if let (Some(handle), Some(store)) = (&hub, &self.store) {
            let state = DashboardState {
                store: Arc::clone(store),
                hub: handle.clone(),
                sources: Arc::new(self.config.sources.iter().map(|s| s.name.clone()).collect()),
            };
            let addr = self.config.dashboard.listen_addr.clone();
            let dashboard_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = dashboard::serve(&addr, state, dashboard_cancel).await {
                    tracing::error!(error = %e, "dashboard unavailable, continuing without it");
                }
            }));
        }

        // 4. backfill
        if self.config.ingest.backfill {
            for source in &self.config.sources {
                match backfill(source, self.config.ingest.backfill_lines, &lines, &cancel).await {
                    Ok(count) => summary.backfilled_lines += count,
                    Err(LogPipelineError::FileOpen { reason, .. }) => {
                        tracing::warn!(source = %source.name, reason = %reason, "backfill skipped");
                    }
                    Err(e) => tracing::warn!(source = %source.name, error = %e, "backfill failed"),
                }
            }
        }

        // 5. tailers
        for source in &self.config.sources {
            let started = FileTailer::new(source).and_then(|tailer| {
                tailer.start(&NotifySource, lines.clone(), errors.clone(), cancel.clone())
            });
            match started {
                Ok(task) => {
                    tasks.push(task);
                    summary.tailed_sources.push(source.name.clone());
                }
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "source disabled");
                    summary.disabled_sources.push(source.name.clone());
                }
            }
        }
        drop(lines);
        drop(errors);

        tracing::info!(
            tailed = summary.tailed_sources.len(),
            disabled = summary.disabled_sources.len(),
            "tailhub running"
        );
        shutdown.await;

        tracing::info!("broadcasting shutdown to all tasks");
        cancel.cancel();
        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(tasks)).await;
        if drained.is_err() {
            tracing::warn!(timeout = ?SHUTDOWN_TIMEOUT, "tasks did not stop in time");
        }
        tracing::info!("tailhub stopped");
        Ok(summary)
    }

    /// Token that stops a running orchestrator when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replay store shared with the dashboard; `None` when the dashboard is off.
    pub fn store(&self) -> Option<&Arc<EventStore>> {
        self.store.as_ref()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &TailhubConfig {
        &self.config
    }
}

/// Logs one line per alert match until shutdown.
fn spawn_alert_logger(
    mut alert_rx: mpsc::Receiver<Match>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                matched = alert_rx.recv() => match matched {
                    Some(matched) => tracing::warn!(rule = %matched.rule_name, "{}", matched),
                    None => break,
                },
            }
        }
        tracing::debug!("alert logger stopped");
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("ctrl-c")
}
