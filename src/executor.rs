//! Command execution boundary
//!
//! Pipe handlers and pipe mutators run external commands through the
//! [`Executor`] trait. [`ProcessExecutor`] is the default implementation: it
//! runs the command through `sh -c`, writes the payload to stdin and
//! enforces the request timeout. Cancelling the caller's token kills the
//! command.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};

/// A command to run with its input payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Name of the handler or mutator the command belongs to
    pub name: String,
    /// Shell command line
    pub command: String,
    /// Extra environment, as `KEY=VALUE` pairs
    pub env: Vec<String>,
    /// Bytes written to the command's stdin
    pub input: Vec<u8>,
    /// Maximum run time; zero disables the limit
    pub timeout: Duration,
}

impl ExecutionRequest {
    /// Create a request with no extra environment and no timeout
    pub fn new(name: impl Into<String>, command: impl Into<String>, input: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            env: Vec::new(),
            input,
            timeout: Duration::ZERO,
        }
    }

    /// Set the environment
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResponse {
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
    /// Combined stdout and stderr
    pub output: String,
    /// Wall-clock run time
    pub duration: Duration,
}

/// Runs external commands
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command to completion
    ///
    /// A non-zero exit status is not an error; callers decide what it
    /// means.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Execution`] when the command cannot be
    /// started or exceeds its timeout, and [`PipelineError::Cancelled`]
    /// when `ctx` is cancelled first.
    async fn execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse>;
}

/// Executor spawning commands through a shell
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    shell: String,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ProcessExecutor {
    /// Create an executor using `sh`
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell; it is invoked as `<shell> -c <command>`
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&request.command);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        for pair in &request.env {
            match pair.split_once('=') {
                Some((key, value)) => {
                    cmd.env(key, value);
                }
                None => tracing::warn!(name = %request.name, env = %pair, "ignoring malformed env var"),
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::Execution(format!(
                "failed to start command for {}: {}",
                request.name, e
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PipelineError::Execution("child stdin unavailable after spawn".to_string())
        })?;
        let input = request.input;
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            // A command that does not read its input closes the pipe early.
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let finished = async {
            if request.timeout.is_zero() {
                Ok(child.wait_with_output().await)
            } else {
                tokio::time::timeout(request.timeout, child.wait_with_output()).await
            }
        };

        // Dropping the wait future kills the child.
        let waited = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                writer.abort();
                tracing::debug!(name = %request.name, "command cancelled");
                return Err(PipelineError::Cancelled.into());
            }
            finished = finished => match finished {
                Ok(output) => output,
                Err(_) => {
                    writer.abort();
                    return Err(PipelineError::Execution(format!(
                        "command for {} timed out after {:?}",
                        request.name, request.timeout
                    ))
                    .into());
                }
            },
        };
        let output = waited.map_err(|e| {
            PipelineError::Execution(format!("failed to wait for {}: {}", request.name, e))
        })?;
        let _ = writer.await;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let response = ExecutionResponse {
            status: output.status.code().unwrap_or(-1),
            output: combined,
            duration: started.elapsed(),
        };
        tracing::debug!(
            name = %request.name,
            status = response.status,
            duration_ms = response.duration.as_millis() as u64,
            "command finished"
        );
        Ok(response)
    }
}
