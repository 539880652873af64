//! `run` command: route one event through the pipeline engine

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use super::load_gateway;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::executor::ProcessExecutor;
use crate::pipeline::filter::PathEvaluator;
use crate::pipeline::{AdapterRegistryBuilder, AdapterV1, PipelineRegistry};
use crate::pipelined::Pipelined;
use crate::resources::{Event, ResourceReference};

/// Read an event from a JSON file, or from stdin when `source` is `-`
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not an event.
pub fn read_event(source: &str) -> Result<Event> {
    let contents = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(PipelineError::Io)?;
        buf
    } else {
        std::fs::read_to_string(source).map_err(PipelineError::Io)?
    };
    let event = serde_json::from_str(&contents).map_err(PipelineError::Serialization)?;
    Ok(event)
}

/// Build the pipeline service over a resource file
///
/// # Errors
///
/// Returns an error if the resource file cannot be loaded.
pub fn build_pipelined(resources: &Path, config: &Config) -> Result<Pipelined> {
    let gateway = load_gateway(resources, config)?;
    let registries = AdapterRegistryBuilder::new(gateway.clone(), Arc::new(ProcessExecutor::new()))
        .with_execution_config(config.execution.clone())
        .with_filter_evaluator(Arc::new(PathEvaluator::new()?))
        .build();

    let adapter = AdapterV1::new(gateway, registries)
        .with_max_handler_set_depth(config.pipeline.max_handler_set_depth);
    let adapters = PipelineRegistry::new("pipeline").with(Arc::new(adapter));

    Ok(Pipelined::new(adapters).with_config(&config.pipelined))
}

/// Run an event through its pipelines
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `resources` - YAML resource file
/// * `event_source` - Event JSON file, or `-` for stdin
/// * `pipelines` - Extra pipeline names to run for the event
///
/// # Errors
///
/// Returns the aggregated pipeline failure if any pipeline failed.
pub async fn run_event(
    config: Config,
    resources: &Path,
    event_source: &str,
    pipelines: Vec<String>,
) -> Result<()> {
    let mut event = read_event(event_source)?;
    for name in pipelines {
        let reference = ResourceReference::pipeline(name);
        if !event.pipelines.contains(&reference) {
            event.pipelines.push(reference);
        }
    }

    let pipelined = build_pipelined(resources, &config)?;

    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let event_id = event.id;
    pipelined.handle_event(&ctx, event).await?;
    println!("{}", format!("Event {} processed", event_id).green());
    Ok(())
}
