//! Handlers, mutators and event filters
//!
//! These are the stored definitions the legacy adapters fetch by name.

use serde::{Deserialize, Serialize};

use super::{validate_name, ObjectMeta, DEFAULT_NAMESPACE};
use crate::error::{PipelineError, Result};

/// Kind of handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerType {
    /// Runs a command with the payload on stdin
    #[default]
    Pipe,
    /// Writes the payload to a TCP socket
    Tcp,
    /// Writes the payload to a UDP socket
    Udp,
    /// Names other handlers; has no behavior of its own
    Set,
    /// Delegates to a gRPC extension
    Grpc,
}

impl HandlerType {
    /// Returns true for handlers that do something when run
    pub fn is_leaf(self) -> bool {
        !matches!(self, HandlerType::Set)
    }
}

impl std::fmt::Display for HandlerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandlerType::Pipe => "pipe",
            HandlerType::Tcp => "tcp",
            HandlerType::Udp => "udp",
            HandlerType::Set => "set",
            HandlerType::Grpc => "grpc",
        };
        write!(f, "{}", name)
    }
}

/// Destination of a tcp or udp handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSocket {
    /// Host name or address
    pub host: String,
    /// Port number
    pub port: u16,
}

/// A stored handler definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Handler name and namespace
    pub metadata: ObjectMeta,

    /// Handler kind
    #[serde(rename = "type", default)]
    pub handler_type: HandlerType,

    /// Command for pipe handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Execution timeout in seconds; 0 uses the configured default
    #[serde(default)]
    pub timeout: u64,

    /// Environment for pipe handlers, as `KEY=VALUE` pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<String>,

    /// Destination for tcp and udp handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<HandlerSocket>,

    /// Member handler names for set handlers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,

    /// Legacy filter names applied when the handler runs in a legacy pipeline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,

    /// Legacy mutator name used when the event names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutator: Option<String>,
}

impl Handler {
    fn empty(name: &str, handler_type: HandlerType) -> Self {
        Self {
            metadata: ObjectMeta::new(name, DEFAULT_NAMESPACE),
            handler_type,
            command: None,
            timeout: 0,
            env_vars: Vec::new(),
            socket: None,
            handlers: Vec::new(),
            filters: Vec::new(),
            mutator: None,
        }
    }

    /// Create a pipe handler
    pub fn pipe(name: &str, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::empty(name, HandlerType::Pipe)
        }
    }

    /// Create a tcp or udp handler
    pub fn socket(name: &str, handler_type: HandlerType, host: &str, port: u16) -> Self {
        Self {
            socket: Some(HandlerSocket {
                host: host.to_string(),
                port,
            }),
            ..Self::empty(name, handler_type)
        }
    }

    /// Create a handler set
    pub fn set(name: &str, members: &[&str]) -> Self {
        Self {
            handlers: members.iter().map(|m| m.to_string()).collect(),
            ..Self::empty(name, HandlerType::Set)
        }
    }

    /// Handler name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns true when the handler is a set
    pub fn is_set(&self) -> bool {
        self.handler_type == HandlerType::Set
    }

    /// Validate the handler definition
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResource`] when required fields for
    /// the handler type are missing.
    pub fn validate(&self) -> Result<()> {
        validate_name("handler", &self.metadata.name)?;
        match self.handler_type {
            HandlerType::Pipe if self.command.as_deref().map_or(true, str::is_empty) => {
                Err(invalid(format!("pipe handler {} has no command", self.name())))
            }
            HandlerType::Tcp | HandlerType::Udp if self.socket.is_none() => Err(invalid(format!(
                "{} handler {} has no socket",
                self.handler_type,
                self.name()
            ))),
            HandlerType::Set if self.handlers.is_empty() => {
                Err(invalid(format!("handler set {} has no members", self.name())))
            }
            _ => Ok(()),
        }
    }
}

/// Kind of mutator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutatorType {
    /// Runs a command with the event JSON on stdin
    #[default]
    Pipe,
    /// Evaluates an expression against the event
    Javascript,
}

/// A stored mutator definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutator {
    /// Mutator name and namespace
    pub metadata: ObjectMeta,

    /// Mutator kind
    #[serde(rename = "type", default)]
    pub mutator_type: MutatorType,

    /// Command for pipe mutators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Execution timeout in seconds; 0 uses the configured default
    #[serde(default)]
    pub timeout: u64,

    /// Environment for pipe mutators, as `KEY=VALUE` pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<String>,

    /// Expression for javascript mutators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<String>,
}

impl Mutator {
    /// Create a pipe mutator
    pub fn pipe(name: &str, command: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(name, DEFAULT_NAMESPACE),
            mutator_type: MutatorType::Pipe,
            command: Some(command.to_string()),
            timeout: 0,
            env_vars: Vec::new(),
            eval: None,
        }
    }

    /// Mutator name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate the mutator definition
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResource`] when the command or
    /// expression required by the mutator type is missing.
    pub fn validate(&self) -> Result<()> {
        validate_name("mutator", &self.metadata.name)?;
        match self.mutator_type {
            MutatorType::Pipe if self.command.as_deref().map_or(true, str::is_empty) => {
                Err(invalid(format!("pipe mutator {} has no command", self.name())))
            }
            MutatorType::Javascript if self.eval.as_deref().map_or(true, str::is_empty) => Err(
                invalid(format!("javascript mutator {} has no eval", self.name())),
            ),
            _ => Ok(()),
        }
    }
}

/// What an event filter does when its expressions match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Only matching events pass
    #[default]
    Allow,
    /// Matching events are dropped
    Deny,
}

/// A stored event filter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Filter name and namespace
    pub metadata: ObjectMeta,

    /// Action taken when every expression matches
    #[serde(default)]
    pub action: FilterAction,

    /// Expressions evaluated against the event, all must match
    #[serde(default)]
    pub expressions: Vec<String>,
}

impl EventFilter {
    /// Create an event filter
    pub fn new(name: &str, action: FilterAction, expressions: &[&str]) -> Self {
        Self {
            metadata: ObjectMeta::new(name, DEFAULT_NAMESPACE),
            action,
            expressions: expressions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Filter name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate the filter definition
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResource`] when the filter has no
    /// expressions.
    pub fn validate(&self) -> Result<()> {
        validate_name("event filter", &self.metadata.name)?;
        if self.expressions.is_empty() {
            return Err(invalid(format!(
                "event filter {} has no expressions",
                self.name()
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> anyhow::Error {
    PipelineError::InvalidResource(message).into()
}
