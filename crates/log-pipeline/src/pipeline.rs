//! Pipeline orchestration -- the single consumer behind every tailer.
//!
//! # Internal architecture
//! ```text
//! FileTailer(s) / backfill --mpsc (blocking)--> LogPipeline::run
//!                                                  |
//!                        parse_or_degrade -> Arc<StructuredEvent>
//!                          |                        |
//!                 AlertEvaluator             Criteria gate
//!                          |                        |
//!        mpsc<Match> (try_send)        EventStore::add, HubHandle::broadcast,
//!                                      stdout record
//! ```
//!
//! Lines are handled one at a time in arrival order, so per-source order is
//! preserved end to end.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use tailhub_core::config::{IngestConfig, SourceConfig};
use tailhub_core::metrics as m;
use tailhub_core::types::StructuredEvent;

use crate::alert::{AlertEvaluator, Match};
use crate::collector::RawLine;
use crate::error::LogPipelineError;
use crate::event::DisplayEvent;
use crate::filter::Criteria;
use crate::hub::HubHandle;
use crate::parser::LineParser;
use crate::store::EventStore;

/// What happened to one raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Blank line, not parsed
    Skipped,
    /// Parsed and alert-checked, rejected by the criteria gate
    Filtered,
    /// Stored, broadcast and written out
    Accepted,
}

/// Counters returned when [`LogPipeline::run`] ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub skipped: u64,
    pub accepted: u64,
    pub alerts: u64,
    pub collector_errors: u64,
}

/// Per-line processing stage: parse, alert, gate, distribute.
pub struct EventProcessor {
    parser: LineParser,
    /// source name -> declared format
    formats: HashMap<String, String>,
    criteria: Criteria,
    alerts: Arc<AlertEvaluator>,
    alert_tx: mpsc::Sender<Match>,
    store: Option<Arc<EventStore>>,
    hub: Option<HubHandle>,
    emit_records: bool,
}

impl EventProcessor {
    /// Runs one line through the stage and reports how far it got.
    ///
    /// Alerts are evaluated for every non-blank line before the criteria
    /// gate. Returns the number of alert matches alongside the disposition.
    pub fn process(&self, raw: &RawLine) -> (Disposition, usize) {
        metrics::counter!(m::LINES_RECEIVED_TOTAL, m::LABEL_SOURCE => raw.source_name.clone())
            .increment(1);
        if raw.is_blank() {
            metrics::counter!(m::LINES_SKIPPED_TOTAL).increment(1);
            return (Disposition::Skipped, 0);
        }

        let started = Instant::now();
        let format = self
            .formats
            .get(&raw.source_name)
            .map(String::as_str)
            .unwrap_or_default();
        let event = Arc::new(self.parser.parse_or_degrade(format, raw));

        let matched = self.raise_alerts(&event);

        let disposition = if self.criteria.matches(&event) {
            self.distribute(&event);
            metrics::counter!(m::EVENTS_EMITTED_TOTAL).increment(1);
            Disposition::Accepted
        } else {
            Disposition::Filtered
        };

        metrics::histogram!(m::PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        (disposition, matched)
    }

    fn raise_alerts(&self, event: &Arc<StructuredEvent>) -> usize {
        let matches = self.alerts.evaluate(event);
        let count = matches.len();
        for matched in matches {
            metrics::counter!(m::ALERT_MATCHES_TOTAL, m::LABEL_RULE => matched.rule_name.clone())
                .increment(1);
            match self.alert_tx.try_send(matched) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    metrics::counter!(m::ALERTS_DROPPED_TOTAL).increment(1);
                    tracing::debug!(rule = %dropped.rule_name, "alert channel full, dropping match");
                }
                Err(TrySendError::Closed(_)) => {
                    metrics::counter!(m::ALERTS_DROPPED_TOTAL).increment(1);
                }
            }
        }
        count
    }

    fn distribute(&self, event: &StructuredEvent) {
        let display = DisplayEvent::from(event);

        if self.hub.is_some() || self.emit_records {
            match display.to_payload() {
                Ok(payload) => {
                    if self.emit_records {
                        write_record(&payload);
                    }
                    if let Some(hub) = &self.hub {
                        hub.broadcast(payload);
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %event.source_name, error = %e, "failed to encode event");
                }
            }
        }

        if let Some(store) = &self.store {
            store.add(display);
        }
    }
}

fn write_record(payload: &[u8]) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout
        .write_all(payload)
        .and_then(|()| stdout.write_all(b"\n"))
    {
        tracing::debug!(error = %e, "failed to write event record");
    }
}

/// The coordinating consumer loop.
///
/// Build with [`LogPipelineBuilder`], hand [`line_sender`](Self::line_sender)
/// and [`error_sender`](Self::error_sender) clones to collectors, then
/// `run` it.
pub struct LogPipeline {
    processor: EventProcessor,
    line_rx: mpsc::Receiver<RawLine>,
    error_rx: mpsc::Receiver<LogPipelineError>,
    line_tx: mpsc::Sender<RawLine>,
    error_tx: mpsc::Sender<LogPipelineError>,
}

impl LogPipeline {
    /// Sender for tailers and backfill. Sends block when the pipeline lags.
    pub fn line_sender(&self) -> mpsc::Sender<RawLine> {
        self.line_tx.clone()
    }

    /// Sender for collector faults. Collectors must use `try_send`.
    pub fn error_sender(&self) -> mpsc::Sender<LogPipelineError> {
        self.error_tx.clone()
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Consumes lines until `cancel` fires or every sender is gone.
    pub async fn run(self, cancel: CancellationToken) -> PipelineStats {
        let Self {
            processor,
            mut line_rx,
            mut error_rx,
            line_tx,
            error_tx,
        } = self;
        // only external clones keep the channels open from here on
        drop(line_tx);
        drop(error_tx);

        let mut stats = PipelineStats::default();
        tracing::info!("log pipeline started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(raw) = line_rx.recv() => {
                    stats.processed += 1;
                    let (disposition, matched) = processor.process(&raw);
                    stats.alerts += matched as u64;
                    match disposition {
                        Disposition::Skipped => stats.skipped += 1,
                        Disposition::Accepted => stats.accepted += 1,
                        Disposition::Filtered => {}
                    }
                }
                Some(err) = error_rx.recv() => {
                    stats.collector_errors += 1;
                    metrics::counter!(m::TAILER_ERRORS_TOTAL).increment(1);
                    tracing::warn!(error = %err, "collector error");
                }
                else => break,
            }
        }

        tracing::info!(
            processed = stats.processed,
            accepted = stats.accepted,
            skipped = stats.skipped,
            alerts = stats.alerts,
            "log pipeline stopped"
        );
        stats
    }
}

/// Log pipeline builder.
///
/// Wires the processing stage and creates the internal channels.
pub struct LogPipelineBuilder {
    sources: Vec<SourceConfig>,
    ingest: IngestConfig,
    criteria: Criteria,
    alerts: Arc<AlertEvaluator>,
    alert_tx: Option<mpsc::Sender<Match>>,
    store: Option<Arc<EventStore>>,
    hub: Option<HubHandle>,
}

impl LogPipelineBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            ingest: IngestConfig::default(),
            criteria: Criteria::default(),
            alerts: Arc::new(AlertEvaluator::default()),
            alert_tx: None,
            store: None,
            hub: None,
        }
    }

    /// Configured sources; their formats drive parser dispatch.
    pub fn sources(mut self, sources: &[SourceConfig]) -> Self {
        self.sources = sources.to_vec();
        self
    }

    /// Channel capacities and the stdout record switch.
    pub fn ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn alerts(mut self, alerts: Arc<AlertEvaluator>) -> Self {
        self.alerts = alerts;
        self
    }

    /// External alert channel. Without it, `build` creates one.
    pub fn alert_sender(mut self, tx: mpsc::Sender<Match>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    pub fn store(mut self, store: Arc<EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn hub(mut self, hub: HubHandle) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Returns
    /// - `LogPipeline`: the consumer loop
    /// - `Option<mpsc::Receiver<Match>>`: alert receiver, `None` when an
    ///   external sender was configured
    pub fn build(self) -> Result<(LogPipeline, Option<mpsc::Receiver<Match>>), LogPipelineError> {
        for (field, value) in [
            ("ingest.channel_capacity", self.ingest.channel_capacity),
            ("ingest.error_channel_capacity", self.ingest.error_channel_capacity),
            ("ingest.alert_channel_capacity", self.ingest.alert_channel_capacity),
        ] {
            if value == 0 {
                return Err(LogPipelineError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        let (line_tx, line_rx) = mpsc::channel(self.ingest.channel_capacity);
        let (error_tx, error_rx) = mpsc::channel(self.ingest.error_channel_capacity);
        let (alert_tx, alert_rx) = match self.alert_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.ingest.alert_channel_capacity);
                (tx, Some(rx))
            }
        };

        let formats = self
            .sources
            .iter()
            .map(|s| (s.name.clone(), s.format.clone()))
            .collect();

        let processor = EventProcessor {
            parser: LineParser::new()?,
            formats,
            criteria: self.criteria,
            alerts: self.alerts,
            alert_tx,
            store: self.store,
            hub: self.hub,
            emit_records: self.ingest.emit_records,
        };

        let pipeline = LogPipeline {
            processor,
            line_rx,
            error_rx,
            line_tx,
            error_tx,
        };
        Ok((pipeline, alert_rx))
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
