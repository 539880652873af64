//! Command-line interface definition for eventpipe
//!
//! This module defines the CLI structure using clap's derive API. Every
//! command works against a YAML resource file loaded into an in-memory
//! store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// eventpipe - monitoring event pipeline engine
///
/// Resolve pipelines for monitoring events and run their filters,
/// mutators and handlers.
#[derive(Parser, Debug, Clone)]
#[command(name = "eventpipe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for eventpipe
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Route an event through its pipelines
    Run {
        /// YAML file with pipelines, handlers, mutators and event filters
        #[arg(short, long)]
        resources: PathBuf,

        /// Event JSON file, or `-` to read it from stdin
        #[arg(short, long, default_value = "-")]
        event: String,

        /// Extra pipeline to run for the event (repeatable)
        #[arg(short, long = "pipeline")]
        pipelines: Vec<String>,
    },

    /// Show the leaf handlers a list of handler names expands to
    Expand {
        /// YAML resource file
        #[arg(short, long)]
        resources: PathBuf,

        /// Override the maximum handler set depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Handler names to expand
        #[arg(required = true)]
        handlers: Vec<String>,
    },

    /// Parse and validate a resource file
    Validate {
        /// YAML resource file
        #[arg(short, long)]
        resources: PathBuf,
    },
}

impl Cli {
    /// Parse command-line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: Commands::Validate {
                resources: PathBuf::from("resources.yaml"),
            },
        }
    }
}
