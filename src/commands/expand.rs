//! `expand` command: show what a list of handler names runs

use std::path::Path;

use colored::Colorize;
use prettytable::{format, row, Table};
use tokio_util::sync::CancellationToken;

use super::load_gateway;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{HandlerExpander, HandlerExpansion};
use crate::resources::{Handler, HandlerType};

/// Expand handler names and print the leaf handlers as a table
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `resources` - YAML resource file
/// * `handlers` - Handler names to expand
/// * `max_depth` - Overrides `pipeline.max_handler_set_depth`
///
/// # Errors
///
/// Returns an error if the resource file cannot be loaded or the store
/// fails. Missing handlers and too-deep sets are reported, not returned.
pub async fn run_expand(
    config: Config,
    resources: &Path,
    handlers: Vec<String>,
    max_depth: Option<usize>,
) -> Result<()> {
    let gateway = load_gateway(resources, &config)?;
    let expander = HandlerExpander::new(gateway)
        .with_max_depth(max_depth.unwrap_or(config.pipeline.max_handler_set_depth));

    let expansion = expander
        .expand(&CancellationToken::new(), &handlers)
        .await?;

    if expansion.handlers.is_empty() {
        println!("{}", "No handlers resolved.".yellow());
    } else {
        println!(
            "\nHandlers resolved from {} (max depth {}):\n",
            handlers.join(", "),
            expander.max_depth()
        );
        expansion_table(&expansion).printstd();
        println!();
    }

    for error in &expansion.errors {
        println!("{} {}", "skipped:".yellow().bold(), error);
    }
    Ok(())
}

/// One row per leaf handler, sorted by name
pub fn expansion_table(expansion: &HandlerExpansion) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Handler", "Type", "Target", "Timeout"]);

    for handler in expansion.handlers.values() {
        let timeout = match handler.timeout {
            0 => "default".to_string(),
            secs => format!("{}s", secs),
        };
        table.add_row(row![
            handler.name(),
            handler.handler_type,
            target(handler),
            timeout
        ]);
    }
    table
}

fn target(handler: &Handler) -> String {
    match handler.handler_type {
        HandlerType::Tcp | HandlerType::Udp => handler
            .socket
            .as_ref()
            .map(|s| format!("{}:{}", s.host, s.port))
            .unwrap_or_else(|| "-".to_string()),
        _ => handler.command.clone().unwrap_or_else(|| "-".to_string()),
    }
}
