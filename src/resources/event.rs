//! Event types processed by the pipeline engine
//!
//! An [`Event`] is either a check result, a metric emission, or both. It
//! may point at stored pipelines through `pipelines`, or carry the legacy
//! handler names of its check and metrics, in which case an ephemeral
//! pipeline is synthesized for it.
//!
//! # Example
//!
//! ```rust
//! use eventpipe::resources::Event;
//!
//! let json = r#"{
//!   "entity": {"metadata": {"name": "web-01"}},
//!   "check": {
//!     "metadata": {"name": "check-http"},
//!     "status": 2,
//!     "output": "HTTP CRITICAL",
//!     "handlers": ["slack"]
//!   }
//! }"#;
//!
//! let event: Event = serde_json::from_str(json).unwrap();
//! assert!(event.is_incident());
//! assert_eq!(event.legacy_handler_names(), vec!["slack".to_string()]);
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{validate_name, ObjectMeta, ResourceReference};
use crate::error::Result;

/// A check result or metric emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Unix timestamp (seconds) when the event was produced
    #[serde(default = "now")]
    pub timestamp: i64,

    /// Entity the event is about
    #[serde(default)]
    pub entity: Entity,

    /// Check result, if the event carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Check>,

    /// Metric points, if the event carries any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,

    /// Stored pipelines that should process this event
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<ResourceReference>,

    /// Legacy filter names applied to every synthesized workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,

    /// Legacy mutator name applied to every synthesized workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutator: Option<String>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now(),
            entity: Entity::default(),
            check: None,
            metrics: None,
            pipelines: Vec::new(),
            filters: Vec::new(),
            mutator: None,
        }
    }
}

impl Event {
    /// Create a check event for an entity
    pub fn with_check(entity: Entity, check: Check) -> Self {
        Self {
            entity,
            check: Some(check),
            ..Self::default()
        }
    }

    /// Namespace of the event, taken from its entity
    pub fn namespace(&self) -> &str {
        &self.entity.metadata.namespace
    }

    /// Returns true when the event carries a check
    pub fn has_check(&self) -> bool {
        self.check.is_some()
    }

    /// Returns true when the event carries metrics
    pub fn has_metrics(&self) -> bool {
        self.metrics.is_some()
    }

    /// Returns true when the check is in a non-OK state
    pub fn is_incident(&self) -> bool {
        self.check.as_ref().map_or(false, |check| check.status != 0)
    }

    /// Returns true when the check just went back to OK
    ///
    /// The previous history entry must be non-OK while the current status
    /// is OK.
    pub fn is_resolution(&self) -> bool {
        let Some(check) = &self.check else {
            return false;
        };
        if check.status != 0 || check.history.len() < 2 {
            return false;
        }
        check.history[check.history.len() - 2].status != 0
    }

    /// Returns true when the check is silenced
    pub fn is_silenced(&self) -> bool {
        self.check.as_ref().map_or(false, |check| check.is_silenced)
    }

    /// Handler names carried by the check and the metrics, in that order
    pub fn legacy_handler_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(check) = &self.check {
            names.extend(check.handlers.iter().cloned());
        }
        if let Some(metrics) = &self.metrics {
            names.extend(metrics.handlers.iter().cloned());
        }
        names
    }

    /// Returns true when the event should go through the legacy pipeline
    pub fn has_legacy_handlers(&self) -> bool {
        !self.legacy_handler_names().is_empty()
    }

    /// Validate the event
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PipelineError::InvalidResource`] if the entity or check
    /// name is invalid. Pipeline references are not checked here; each one
    /// is dispatched on its own.
    pub fn validate(&self) -> Result<()> {
        validate_name("entity", &self.entity.metadata.name)?;
        if let Some(check) = &self.check {
            validate_name("check", &check.metadata.name)?;
        }
        Ok(())
    }
}

/// The monitored entity an event is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name and namespace
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Entity class ("agent", "proxy", ...)
    #[serde(default = "default_entity_class")]
    pub entity_class: String,

    /// Subscriptions of the entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<String>,
}

fn default_entity_class() -> String {
    "agent".to_string()
}

impl Entity {
    /// Create an agent entity in the default namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(name, super::DEFAULT_NAMESPACE),
            entity_class: default_entity_class(),
            subscriptions: Vec::new(),
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new("")
    }
}

/// A check result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Check {
    /// Check name
    pub metadata: ObjectMeta,
    /// Exit status: 0 OK, 1 warning, 2 critical, anything else unknown
    pub status: u32,
    /// Check output
    pub output: String,
    /// Legacy handler names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,
    /// Previous results, oldest first, the current one last
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<CheckHistory>,
    /// Consecutive occurrences of the current status
    pub occurrences: i64,
    /// Whether a silence entry matches this check
    pub is_silenced: bool,
    /// Names of matching silence entries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub silenced: Vec<String>,
}

impl Check {
    /// Create a check with a name and status
    pub fn new(name: impl Into<String>, status: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(name, super::DEFAULT_NAMESPACE),
            status,
            ..Self::default()
        }
    }
}

/// One entry of a check's status history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHistory {
    /// Status of that execution
    pub status: u32,
    /// Unix timestamp of that execution
    #[serde(default)]
    pub executed: i64,
}

/// Metric points carried by an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Legacy handler names for the metrics
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,
    /// Metric points
    pub points: Vec<MetricPoint>,
}

/// A single metric measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricPoint {
    /// Metric name
    pub name: String,
    /// Measured value
    pub value: f64,
    /// Unix timestamp of the measurement
    pub timestamp: i64,
    /// Tags of the point
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<MetricTag>,
}

/// A metric tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTag {
    /// Tag name
    pub name: String,
    /// Tag value
    pub value: String,
}
