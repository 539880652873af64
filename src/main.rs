//! eventpipe - monitoring event pipeline engine
//!
#![doc = "eventpipe - monitoring event pipeline engine"]
#![doc = "Main entry point for the eventpipe command-line tool."]

use anyhow::Result;

use eventpipe::cli::{Cli, Commands};
use eventpipe::commands;
use eventpipe::config::Config;
use eventpipe::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    init_logging(&config.logging)?;

    eventpipe::metrics::init_metrics_exporter();

    match cli.command {
        Commands::Run {
            resources,
            event,
            pipelines,
        } => {
            tracing::info!("Running event through pipelines");
            commands::run::run_event(config, &resources, &event, pipelines).await?;
            Ok(())
        }
        Commands::Expand {
            resources,
            max_depth,
            handlers,
        } => {
            tracing::info!("Expanding handlers");
            commands::expand::run_expand(config, &resources, handlers, max_depth).await?;
            Ok(())
        }
        Commands::Validate { resources } => {
            tracing::info!("Validating resource file");
            commands::validate::run_validate(&resources)?;
            Ok(())
        }
    }
}
