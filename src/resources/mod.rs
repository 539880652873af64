//! Resource types for the pipeline engine
//!
//! This module contains the configuration resources the engine resolves
//! (pipelines, handlers, mutators, event filters), the event it
//! processes, and [`ResourceReference`], the `{api_version, type, name}`
//! triple used to point at a resource without embedding it.
//!
//! # Modules
//!
//! - [`event`]: Events, checks, metrics and entities
//! - [`pipeline`]: Pipelines and their workflows
//! - [`handler`]: Handlers, mutators and event filters

pub mod event;
pub mod handler;
pub mod pipeline;

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use event::{Check, CheckHistory, Entity, Event, MetricPoint, MetricTag, Metrics};
pub use handler::{
    EventFilter, FilterAction, Handler, HandlerSocket, HandlerType, Mutator, MutatorType,
};
pub use pipeline::{Pipeline, PipelineWorkflow};

/// API version of every built-in resource
pub const CORE_API_VERSION: &str = "core/v2";

/// Resource type names used in references
pub mod kind {
    /// Pipeline resource type
    pub const PIPELINE: &str = "Pipeline";
    /// Handler resource type
    pub const HANDLER: &str = "Handler";
    /// Mutator resource type
    pub const MUTATOR: &str = "Mutator";
    /// Event filter resource type
    pub const EVENT_FILTER: &str = "EventFilter";
}

/// Namespace assumed when a resource does not carry one
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Identifies a configuration object by kind and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    /// API version of the referenced resource (e.g. "core/v2")
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Resource type (e.g. "Pipeline", "Handler")
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Name of the referenced resource
    #[serde(default)]
    pub name: String,
}

fn default_api_version() -> String {
    CORE_API_VERSION.to_string()
}

impl ResourceReference {
    /// Create a reference from its three parts
    pub fn new(
        api_version: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Reference to a `core/v2` pipeline
    pub fn pipeline(name: impl Into<String>) -> Self {
        Self::new(CORE_API_VERSION, kind::PIPELINE, name)
    }

    /// Reference to a `core/v2` handler
    pub fn handler(name: impl Into<String>) -> Self {
        Self::new(CORE_API_VERSION, kind::HANDLER, name)
    }

    /// Reference to a `core/v2` mutator
    pub fn mutator(name: impl Into<String>) -> Self {
        Self::new(CORE_API_VERSION, kind::MUTATOR, name)
    }

    /// Reference to a `core/v2` event filter
    pub fn event_filter(name: impl Into<String>) -> Self {
        Self::new(CORE_API_VERSION, kind::EVENT_FILTER, name)
    }

    /// Returns true when the reference names a resource of the given type
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type == resource_type
    }

    /// Returns true when the reference names a pipeline
    pub fn is_pipeline(&self) -> bool {
        self.is_type(kind::PIPELINE)
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.api_version, self.resource_type, self.name)
    }
}

/// Name and namespace shared by every stored resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Resource name, unique per kind and namespace
    pub name: String,
    /// Namespace the resource lives in
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Free-form labels
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
    /// Create metadata with a name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
        }
    }
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self::new("", DEFAULT_NAMESPACE)
    }
}

/// Any resource that can reach the pipeline adapter entry point
///
/// Serialized adjacently tagged, as `{type: Handler, spec: {...}}`, which is
/// also the document format of resource files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec")]
pub enum Resource {
    /// A check result or metric emission
    Event(Event),
    /// A stored pipeline
    Pipeline(Pipeline),
    /// A stored handler
    Handler(Handler),
    /// A stored mutator
    Mutator(Mutator),
    /// A stored event filter
    EventFilter(EventFilter),
}

impl Resource {
    /// Resource type name, matching the `type` of a reference to it
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Event(_) => "Event",
            Resource::Pipeline(_) => kind::PIPELINE,
            Resource::Handler(_) => kind::HANDLER,
            Resource::Mutator(_) => kind::MUTATOR,
            Resource::EventFilter(_) => kind::EVENT_FILTER,
        }
    }

    /// Name of the resource; events are named after their id
    pub fn name(&self) -> String {
        match self {
            Resource::Event(event) => event.id.to_string(),
            Resource::Pipeline(pipeline) => pipeline.metadata.name.clone(),
            Resource::Handler(handler) => handler.metadata.name.clone(),
            Resource::Mutator(mutator) => mutator.metadata.name.clone(),
            Resource::EventFilter(filter) => filter.metadata.name.clone(),
        }
    }

    /// Returns the event when the resource is one
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Resource::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Validate the resource definition
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResource`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        match self {
            Resource::Event(event) => event.validate(),
            Resource::Pipeline(pipeline) => pipeline.validate(),
            Resource::Handler(handler) => handler.validate(),
            Resource::Mutator(mutator) => mutator.validate(),
            Resource::EventFilter(filter) => filter.validate(),
        }
    }
}

impl From<Event> for Resource {
    fn from(event: Event) -> Self {
        Resource::Event(event)
    }
}

impl From<Pipeline> for Resource {
    fn from(pipeline: Pipeline) -> Self {
        Resource::Pipeline(pipeline)
    }
}

impl From<Handler> for Resource {
    fn from(handler: Handler) -> Self {
        Resource::Handler(handler)
    }
}

impl From<Mutator> for Resource {
    fn from(mutator: Mutator) -> Self {
        Resource::Mutator(mutator)
    }
}

impl From<EventFilter> for Resource {
    fn from(filter: EventFilter) -> Self {
        Resource::EventFilter(filter)
    }
}

/// Validate a resource name: word characters, dots and dashes only
///
/// # Errors
///
/// Returns [`PipelineError::InvalidResource`] when the name is empty or
/// contains other characters.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[\w.\-]+$")?;
    if name.is_empty() {
        return Err(PipelineError::InvalidResource(format!("{} name must not be empty", kind)).into());
    }
    if !pattern.is_match(name) {
        return Err(PipelineError::InvalidResource(format!(
            "{} name {:?} contains invalid characters",
            kind, name
        ))
        .into());
    }
    Ok(())
}
