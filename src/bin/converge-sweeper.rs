//! Leak sweeper for converge integration runs.
//!
//! This binary deletes every ECS instance whose name starts with
//! `CONVERGE_SWEEP_PREFIX` (default `converge-test-`) and then verifies that
//! none remain.

use std::io::Write as _;
use std::sync::Arc;

use clap::Parser;
use converge::sweeper::{DEFAULT_NAME_PREFIX, SWEEP_PREFIX_ENV};
use converge::{EcsService, ProviderConfig, SweepConfig, Sweeper};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "converge-sweeper",
    about = "Delete leaked converge test instances"
)]
struct Cli {
    /// Instances whose name starts with this prefix are deleted.
    #[arg(long, env = SWEEP_PREFIX_ENV, default_value = DEFAULT_NAME_PREFIX)]
    name_prefix: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("converge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SweepConfig::new(cli.name_prefix).map_err(|err| err.to_string())?;
    let provider = ProviderConfig::load_without_cli_args().map_err(|err| err.to_string())?;
    let client = provider.client().map_err(|err| err.to_string())?;
    let sweeper = Sweeper::new(config, EcsService::new(Arc::new(client), provider.settings()));
    let summary = sweeper.sweep().await.map_err(|err| err.to_string())?;
    writeln!(
        std::io::stdout(),
        "sweep complete: deleted_instances={}",
        summary.deleted_instances
    )
    .map_err(|err| err.to_string())?;
    Ok(())
}
