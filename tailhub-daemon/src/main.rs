use anyhow::Result;
use clap::Parser;

use tailhub_daemon::cli::DaemonCli;
use tailhub_daemon::logging;
use tailhub_daemon::orchestrator::Orchestrator;
use tailhub_log_pipeline::{AlertEvaluator, Criteria};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let config = cli.load_config().await?;
    let inputs = cli.criteria_inputs();

    if cli.validate {
        Criteria::from_inputs(&inputs).map_err(|e| anyhow::anyhow!("invalid filter: {}", e))?;
        AlertEvaluator::new(&config.alerts)
            .map_err(|e| anyhow::anyhow!("invalid alert rules: {}", e))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "tailhub-daemon starting");

    let orchestrator = Orchestrator::build_from_config(config, &inputs)?;
    orchestrator.run().await?;

    tracing::info!("tailhub-daemon shut down");
    Ok(())
}
