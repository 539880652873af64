//! In-process configuration store
//!
//! [`MemoryStore`] keeps resources in maps keyed by name. It backs the CLI,
//! where resources are loaded from a multi-document YAML file:
//!
//! ```yaml
//! type: Handler
//! spec:
//!   metadata:
//!     name: slack
//!   type: pipe
//!   command: slack-notify
//! ---
//! type: Pipeline
//! spec:
//!   metadata:
//!     name: incidents
//!   workflows:
//!     - name: notify
//!       handler:
//!         type: Handler
//!         name: slack
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Store, StoreResult};
use crate::error::{PipelineError, Result};
use crate::resources::{EventFilter, Handler, Mutator, Pipeline, Resource};

#[derive(Debug, Default)]
struct Resources {
    pipelines: HashMap<String, Pipeline>,
    handlers: HashMap<String, Handler>,
    mutators: HashMap<String, Mutator>,
    filters: HashMap<String, EventFilter>,
}

/// Store keeping every resource in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: RwLock<Resources>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a multi-document YAML resource file into a store
    ///
    /// Event documents are skipped; events are never stored.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Yaml`] if a document cannot be parsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventpipe::store::MemoryStore;
    ///
    /// let yaml = "type: Handler\nspec:\n  metadata:\n    name: slack\n  command: notify\n";
    /// let store = MemoryStore::from_yaml(yaml).unwrap();
    /// assert_eq!(store.len(), 1);
    /// ```
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let store = Self::new();
        for resource in parse_resources(contents)? {
            store.put(resource);
        }
        Ok(store)
    }

    /// Load a YAML resource file from disk
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or any
    /// error from [`MemoryStore::from_yaml`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(PipelineError::Io)?;
        Self::from_yaml(&contents)
    }

    /// Insert or replace a resource
    pub fn put(&self, resource: Resource) {
        match resource {
            Resource::Pipeline(pipeline) => self.put_pipeline(pipeline),
            Resource::Handler(handler) => self.put_handler(handler),
            Resource::Mutator(mutator) => self.put_mutator(mutator),
            Resource::EventFilter(filter) => self.put_event_filter(filter),
            Resource::Event(event) => {
                tracing::warn!(event_id = %event.id, "events are not stored, skipping");
            }
        }
    }

    /// Insert or replace a pipeline
    pub fn put_pipeline(&self, pipeline: Pipeline) {
        let mut resources = self.write();
        resources
            .pipelines
            .insert(pipeline.metadata.name.clone(), pipeline);
    }

    /// Insert or replace a handler
    pub fn put_handler(&self, handler: Handler) {
        let mut resources = self.write();
        resources
            .handlers
            .insert(handler.metadata.name.clone(), handler);
    }

    /// Insert or replace a mutator
    pub fn put_mutator(&self, mutator: Mutator) {
        let mut resources = self.write();
        resources
            .mutators
            .insert(mutator.metadata.name.clone(), mutator);
    }

    /// Insert or replace an event filter
    pub fn put_event_filter(&self, filter: EventFilter) {
        let mut resources = self.write();
        resources.filters.insert(filter.metadata.name.clone(), filter);
    }

    /// Total number of stored resources
    pub fn len(&self) -> usize {
        let resources = self.read();
        resources.pipelines.len()
            + resources.handlers.len()
            + resources.mutators.len()
            + resources.filters.len()
    }

    /// Returns true when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Resources> {
        self.resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Resources> {
        self.resources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_pipeline_by_name(&self, name: &str) -> StoreResult<Pipeline> {
        Ok(self.read().pipelines.get(name).cloned())
    }

    async fn get_handler_by_name(&self, name: &str) -> StoreResult<Handler> {
        Ok(self.read().handlers.get(name).cloned())
    }

    async fn get_mutator_by_name(&self, name: &str) -> StoreResult<Mutator> {
        Ok(self.read().mutators.get(name).cloned())
    }

    async fn get_event_filter_by_name(&self, name: &str) -> StoreResult<EventFilter> {
        Ok(self.read().filters.get(name).cloned())
    }
}

/// Parse every document of a YAML resource file
///
/// # Errors
///
/// Returns [`PipelineError::Yaml`] naming the failing document.
pub fn parse_resources(contents: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(PipelineError::Yaml)?;
        if value.is_null() {
            continue;
        }
        let resource: Resource = serde_yaml::from_value(value).map_err(|e| {
            PipelineError::InvalidResource(format!("document {}: {}", index + 1, e))
        })?;
        resources.push(resource);
    }
    Ok(resources)
}
