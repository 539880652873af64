//! Error types for eventpipe
//!
//! This module defines the error taxonomy used throughout the pipeline
//! engine, using `thiserror` for ergonomic error handling. Store failures
//! are modeled separately from pipeline failures so callers can tell a
//! missing resource apart from an unreachable store.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by the configuration store boundary
///
/// A store that answers "no error, no result" is normalized to
/// [`StoreError::NotFound`] by the store gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested resource is absent from the store
    #[error("{kind} does not exist")]
    NotFound {
        /// Human readable resource kind ("pipeline", "handler", ...)
        kind: &'static str,
        /// Name that was looked up
        name: String,
    },

    /// The store failed or did not answer within its deadline
    #[error("internal error: {message}")]
    Internal {
        /// Underlying store message, e.g. "etcd timeout"
        message: String,
    },

    /// The caller cancelled the request before the store answered
    #[error("store request cancelled")]
    Cancelled,
}

impl StoreError {
    /// Build an internal store error from any message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true when the error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline engine was handed something other than an event
    #[error("resource is not an Event")]
    NotAnEvent,

    /// Store failure while resolving a pipeline
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The resolved pipeline has nothing to execute
    #[error("pipeline has no workflows")]
    NoWorkflows,

    /// No registered adapter declared itself capable of a reference
    #[error("unsupported resource reference {reference}: no {capability} adapter can handle it")]
    UnsupportedReference {
        /// Capability that was being dispatched ("filter", "mutator", ...)
        capability: &'static str,
        /// Rendered resource reference
        reference: String,
    },

    /// Handler set expansion went deeper than allowed
    #[error("maximum handler set expansion depth exceeded: limit={limit}")]
    DepthExceeded {
        /// Configured expansion ceiling
        limit: usize,
    },

    /// A handler could not be fetched by a handler adapter
    #[error("failed to fetch handler from store: {0}")]
    HandlerFetch(StoreError),

    /// A mutator could not be fetched by a mutator adapter
    #[error("failed to fetch mutator from store: {0}")]
    MutatorFetch(StoreError),

    /// An event filter could not be fetched by a filter adapter
    #[error("failed to fetch event filter from store: {0}")]
    FilterFetch(StoreError),

    /// An external command failed to run
    #[error("Execution error: {0}")]
    Execution(String),

    /// A socket handler failed to deliver its payload
    #[error("Socket error: {0}")]
    Socket(String),

    /// One or more workflows of a pipeline failed
    #[error("{0}")]
    Workflows(RunFailures),

    /// One or more pipelines failed for a single event
    #[error("{0}")]
    Pipelines(RunFailures),

    /// The caller cancelled the run
    #[error("pipeline run cancelled")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource definitions that fail validation
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A single labeled failure inside a run
#[derive(Debug)]
pub struct RunFailure {
    /// Workflow or pipeline name the failure belongs to
    pub label: String,
    /// The underlying error
    pub error: anyhow::Error,
}

/// Failures accumulated while running independent units of work
///
/// With exactly one failure the aggregate renders as that failure's own
/// message, so callers see the underlying cause verbatim.
#[derive(Debug, Default)]
pub struct RunFailures {
    failures: Vec<RunFailure>,
}

impl RunFailures {
    /// Record a failure against a label
    pub fn push(&mut self, label: impl Into<String>, error: anyhow::Error) {
        self.failures.push(RunFailure {
            label: label.into(),
            error,
        });
    }

    /// Returns true when nothing failed
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Iterate over the recorded failures in the order they happened
    pub fn iter(&self) -> impl Iterator<Item = &RunFailure> {
        self.failures.iter()
    }
}

impl fmt::Display for RunFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "no failures"),
            [single] => write!(f, "{}", single.error),
            many => {
                write!(f, "{} failures: ", many.len())?;
                for (i, failure) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}: {}", failure.label, failure.error)?;
                }
                Ok(())
            }
        }
    }
}

/// Result type alias for eventpipe operations
///
/// Uses `anyhow::Error` so adapter errors keep their context; callers
/// classify failures with `downcast_ref::<PipelineError>()`.
pub type Result<T> = anyhow::Result<T>;

/// Returns true when an error chain was caused by cancellation
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<PipelineError>(),
            Some(PipelineError::Cancelled)
                | Some(PipelineError::Store(StoreError::Cancelled))
                | Some(PipelineError::HandlerFetch(StoreError::Cancelled))
                | Some(PipelineError::MutatorFetch(StoreError::Cancelled))
                | Some(PipelineError::FilterFetch(StoreError::Cancelled))
        ) || matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::Cancelled))
    })
}
