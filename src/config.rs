//! Configuration management for eventpipe
//!
//! This module handles loading, parsing, and validating configuration
//! from files, environment variables, and command-line arguments.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for eventpipe
///
/// # Examples
///
/// ```
/// use eventpipe::Config;
///
/// let config = Config::default();
/// assert_eq!(config.pipeline.max_handler_set_depth, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Pipeline engine configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Event intake service configuration
    #[serde(default)]
    pub pipelined: PipelinedConfig,

    /// Mutator and handler execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline resolution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Deadline for a single store request, in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    /// Maximum handler set nesting followed during legacy expansion
    #[serde(default = "default_max_handler_set_depth")]
    pub max_handler_set_depth: usize,
}

fn default_store_timeout() -> u64 {
    60
}

fn default_max_handler_set_depth() -> usize {
    crate::pipeline::expand::DEFAULT_MAX_DEPTH
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: default_store_timeout(),
            max_handler_set_depth: default_max_handler_set_depth(),
        }
    }
}

impl PipelineConfig {
    /// Store request deadline as a [`Duration`]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Upper bound on concurrently processed events
pub const MAX_WORKERS: usize = 10_000;

/// Event intake settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelinedConfig {
    /// Number of events processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the intake channel
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_workers() -> usize {
    100
}

fn default_buffer_size() -> usize {
    100
}

impl Default for PipelinedConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Timeouts for running pipe commands and delivering socket payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Timeout for pipe mutators and handlers that do not set their own
    #[serde(default = "default_execution_timeout")]
    pub default_timeout_secs: u64,

    /// Deadline for tcp and udp handler delivery
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,
}

fn default_execution_timeout() -> u64 {
    60
}

fn default_socket_timeout() -> u64 {
    60
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_execution_timeout(),
            socket_timeout_secs: default_socket_timeout(),
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "eventpipe=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(timeout) = std::env::var("EVENTPIPE_STORE_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.pipeline.store_timeout_secs = v;
                    tracing::debug!(store_timeout_secs = v, "Env override: EVENTPIPE_STORE_TIMEOUT");
                }
                Err(_) => tracing::warn!("Invalid value for EVENTPIPE_STORE_TIMEOUT: {}", timeout),
            }
        }

        if let Ok(depth) = std::env::var("EVENTPIPE_MAX_HANDLER_SET_DEPTH") {
            match depth.parse::<usize>() {
                Ok(v) => {
                    self.pipeline.max_handler_set_depth = v;
                    tracing::debug!(
                        max_handler_set_depth = v,
                        "Env override: EVENTPIPE_MAX_HANDLER_SET_DEPTH"
                    );
                }
                Err(_) => tracing::warn!(
                    "Invalid value for EVENTPIPE_MAX_HANDLER_SET_DEPTH: {}",
                    depth
                ),
            }
        }

        if let Ok(workers) = std::env::var("EVENTPIPE_WORKERS") {
            match workers.parse::<usize>() {
                Ok(v) => {
                    self.pipelined.workers = v;
                    tracing::debug!(workers = v, "Env override: EVENTPIPE_WORKERS");
                }
                Err(_) => tracing::warn!("Invalid value for EVENTPIPE_WORKERS: {}", workers),
            }
        }

        if let Ok(buffer) = std::env::var("EVENTPIPE_BUFFER_SIZE") {
            match buffer.parse::<usize>() {
                Ok(v) => {
                    self.pipelined.buffer_size = v;
                    tracing::debug!(buffer_size = v, "Env override: EVENTPIPE_BUFFER_SIZE");
                }
                Err(_) => tracing::warn!("Invalid value for EVENTPIPE_BUFFER_SIZE: {}", buffer),
            }
        }

        if let Ok(timeout) = std::env::var("EVENTPIPE_EXECUTION_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.execution.default_timeout_secs = v;
                    tracing::debug!(
                        default_timeout_secs = v,
                        "Env override: EVENTPIPE_EXECUTION_TIMEOUT"
                    );
                }
                Err(_) => tracing::warn!(
                    "Invalid value for EVENTPIPE_EXECUTION_TIMEOUT: {}",
                    timeout
                ),
            }
        }

        if let Ok(timeout) = std::env::var("EVENTPIPE_SOCKET_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.execution.socket_timeout_secs = v;
                    tracing::debug!(socket_timeout_secs = v, "Env override: EVENTPIPE_SOCKET_TIMEOUT");
                }
                Err(_) => tracing::warn!("Invalid value for EVENTPIPE_SOCKET_TIMEOUT: {}", timeout),
            }
        }

        if let Ok(level) = std::env::var("EVENTPIPE_LOG_LEVEL") {
            tracing::debug!(level = %level, "Env override: EVENTPIPE_LOG_LEVEL");
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("EVENTPIPE_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => {
                    self.logging.json_format = v;
                    tracing::debug!(json_logs = v, "Env override: EVENTPIPE_JSON_LOGS");
                }
                Err(_) => tracing::warn!("Invalid value for EVENTPIPE_JSON_LOGS: {}", json_logs),
            }
        }

        if let Ok(log_file) = std::env::var("EVENTPIPE_LOG_FILE") {
            tracing::debug!(log_file = %log_file, "Env override: EVENTPIPE_LOG_FILE");
            self.logging.file_path = Some(log_file);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
            tracing::debug!("Verbose mode enabled");
        }
        if cli.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.store_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "store_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.pipeline.max_handler_set_depth == 0 {
            return Err(PipelineError::Config(
                "max_handler_set_depth must be greater than 0".to_string(),
            )
            .into());
        }

        if self.pipelined.workers == 0 {
            return Err(
                PipelineError::Config("workers must be greater than 0".to_string()).into(),
            );
        }

        if self.pipelined.workers > MAX_WORKERS {
            return Err(PipelineError::Config(format!(
                "workers must be at most {}",
                MAX_WORKERS
            ))
            .into());
        }

        if self.pipelined.buffer_size == 0 {
            return Err(
                PipelineError::Config("buffer_size must be greater than 0".to_string()).into(),
            );
        }

        if self.execution.default_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "default_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.execution.socket_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "socket_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.logging.level.trim().is_empty() {
            return Err(PipelineError::Config("log level cannot be empty".to_string()).into());
        }

        Ok(())
    }
}
