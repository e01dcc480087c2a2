//! eval-fleet - launch local inference servers and distribute evaluation jobs

use anyhow::Result;
use clap::Parser;

use eval_fleet_core::Orchestrator;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = cli.into_config();
    tracing::info!(?config, "parsed configuration");

    let summary = Orchestrator::new(config).run().await?;
    tracing::info!(
        workers = summary.total_workers,
        completed = summary.total_completed,
        failed = summary.total_failed,
        "run finished"
    );

    Ok(())
}
