//! Pipeline engine: adapters, capability dispatch and workflow execution
//!
//! Work on an event is delegated to adapters. Each adapter declares, through
//! [`Adapter::can_handle`], which resource references it serves; an
//! [`AdapterRegistry`] scans its adapters in registration order and hands
//! the reference to the first one that accepts it.
//!
//! # Modules
//!
//! - [`adapter_v1`]: the workflow executor, resolving and running pipelines
//! - [`expand`]: recursive expansion of legacy handler sets
//! - [`filter`]: built-in and store-backed filter adapters
//! - [`mutator`]: built-in and store-backed mutator adapters
//! - [`handler`]: the store-backed handler adapter
//! - [`registry_builder`]: default registry wiring
//! - [`resolver`]: stored pipeline lookup and legacy pipeline synthesis

pub mod adapter_v1;
pub mod expand;
pub mod filter;
pub mod handler;
pub mod mutator;
pub mod registry_builder;
pub mod resolver;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::resources::{Event, Handler, Resource, ResourceReference};

pub use adapter_v1::AdapterV1;
pub use expand::{HandlerExpander, HandlerExpansion};
pub use registry_builder::{AdapterRegistries, AdapterRegistryBuilder};
pub use resolver::{PipelineResolver, LEGACY_PIPELINE_NAME};

/// Resolved leaf handlers keyed by handler name
pub type HandlerMap = BTreeMap<String, Handler>;

/// Identity and capability declaration shared by every adapter kind
pub trait Adapter: Send + Sync {
    /// Adapter name, used in logs
    fn name(&self) -> &str;

    /// Returns true when the adapter can serve the reference
    ///
    /// Must be pure: dispatch may call it any number of times.
    fn can_handle(&self, reference: &ResourceReference) -> bool;
}

/// Decides whether an event continues through a workflow
#[async_trait]
pub trait FilterAdapter: Adapter {
    /// Evaluate the filter
    ///
    /// Returns `true` when the event must be denied (filtered out).
    async fn filter(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
    ) -> Result<bool>;
}

/// Turns an event into the payload bytes handed to a handler
#[async_trait]
pub trait MutatorAdapter: Adapter {
    /// Produce the payload for the event
    async fn mutate(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
    ) -> Result<Vec<u8>>;
}

/// Delivers a payload
#[async_trait]
pub trait HandlerAdapter: Adapter {
    /// Handle the event with the mutated payload
    async fn handle(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
        payload: &[u8],
    ) -> Result<()>;
}

/// Runs whole pipelines for a resource
#[async_trait]
pub trait PipelineAdapter: Adapter {
    /// Run the referenced pipeline for the resource
    ///
    /// `None` asks for the legacy pipeline synthesized from the event's
    /// handler names.
    async fn run(
        &self,
        ctx: &CancellationToken,
        reference: Option<&ResourceReference>,
        resource: &Resource,
    ) -> Result<()>;

    /// Returns true when the adapter can run legacy pipelines
    fn runs_legacy(&self) -> bool {
        false
    }
}

/// Ordered adapters of one capability
///
/// Registries are built once and shared read-only across runs.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use eventpipe::pipeline::{Adapter, MutatorRegistry};
/// use eventpipe::pipeline::mutator::JsonMutator;
/// use eventpipe::resources::ResourceReference;
///
/// let registry = MutatorRegistry::new("mutator").with(Arc::new(JsonMutator));
/// let adapter = registry.find(&ResourceReference::mutator("json")).unwrap();
/// assert_eq!(adapter.name(), "JSONAdapter");
/// assert!(registry.find(&ResourceReference::mutator("sed")).is_none());
/// ```
pub struct AdapterRegistry<T: ?Sized> {
    capability: &'static str,
    adapters: Vec<Arc<T>>,
}

/// Filter adapters in dispatch order
pub type FilterRegistry = AdapterRegistry<dyn FilterAdapter>;
/// Mutator adapters in dispatch order
pub type MutatorRegistry = AdapterRegistry<dyn MutatorAdapter>;
/// Handler adapters in dispatch order
pub type HandlerRegistry = AdapterRegistry<dyn HandlerAdapter>;
/// Pipeline adapters in dispatch order
pub type PipelineRegistry = AdapterRegistry<dyn PipelineAdapter>;

impl<T: ?Sized + Adapter> AdapterRegistry<T> {
    /// Create an empty registry for a capability ("filter", "mutator", ...)
    pub fn new(capability: &'static str) -> Self {
        Self {
            capability,
            adapters: Vec::new(),
        }
    }

    /// Append an adapter, returning the registry for chaining
    pub fn with(mut self, adapter: Arc<T>) -> Self {
        self.register(adapter);
        self
    }

    /// Append an adapter; earlier adapters take precedence
    pub fn register(&mut self, adapter: Arc<T>) {
        tracing::debug!(
            capability = self.capability,
            adapter = adapter.name(),
            "registering adapter"
        );
        self.adapters.push(adapter);
    }

    /// First adapter capable of serving the reference
    ///
    /// When a later adapter also claims the reference a warning names both;
    /// the first one still wins.
    pub fn find(&self, reference: &ResourceReference) -> Option<&Arc<T>> {
        let mut capable = self.adapters.iter().filter(|a| a.can_handle(reference));
        let first = capable.next()?;
        for shadowed in capable {
            tracing::warn!(
                capability = self.capability,
                reference = %reference,
                adapter = first.name(),
                shadowed = shadowed.name(),
                "multiple adapters claim reference, using the first"
            );
        }
        Some(first)
    }

    /// Like [`AdapterRegistry::find`], failing when no adapter is capable
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedReference`].
    pub fn dispatch(&self, reference: &ResourceReference) -> Result<&Arc<T>> {
        self.find(reference).ok_or_else(|| {
            PipelineError::UnsupportedReference {
                capability: self.capability,
                reference: reference.to_string(),
            }
            .into()
        })
    }

    /// Adapter names in dispatch order
    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Iterate over the adapters in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
