use anyhow::Result;
use clap::Parser;

use storefleet::cli::{commands, Cli};
use storefleet::config::OrchestratorConfig;
use storefleet::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    OrchestratorConfig::load_env_file()?;
    let config = OrchestratorConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability);

    commands::execute(cli, config).await
}
