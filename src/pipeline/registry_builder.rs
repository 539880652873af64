//! Default adapter registry wiring
//!
//! Builds the filter, mutator and handler registries a pipeline engine
//! dispatches to. Built-in adapters are registered ahead of the
//! store-backed ones, so a built-in name always wins.

use std::sync::Arc;
use std::time::Duration;

use super::filter::{FilterEvaluator, HasMetrics, IsIncident, LegacyFilterAdapter, NotSilenced};
use super::handler::LegacyHandlerAdapter;
use super::mutator::{JsonMutator, LegacyMutatorAdapter, OnlyCheckOutput};
use super::{FilterRegistry, HandlerRegistry, MutatorRegistry};
use crate::config::ExecutionConfig;
use crate::executor::Executor;
use crate::store::StoreGateway;

/// The three per-workflow registries
pub struct AdapterRegistries {
    /// Filter adapters in dispatch order
    pub filters: FilterRegistry,
    /// Mutator adapters in dispatch order
    pub mutators: MutatorRegistry,
    /// Handler adapters in dispatch order
    pub handlers: HandlerRegistry,
}

impl AdapterRegistries {
    /// Registries with no adapters at all
    pub fn empty() -> Self {
        Self {
            filters: FilterRegistry::new("filter"),
            mutators: MutatorRegistry::new("mutator"),
            handlers: HandlerRegistry::new("handler"),
        }
    }
}

impl Default for AdapterRegistries {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder for the default adapter registries
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use eventpipe::executor::ProcessExecutor;
/// use eventpipe::pipeline::AdapterRegistryBuilder;
/// use eventpipe::store::{MemoryStore, StoreGateway};
///
/// let gateway = StoreGateway::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
/// let registries = AdapterRegistryBuilder::new(gateway, Arc::new(ProcessExecutor::new())).build();
///
/// assert_eq!(registries.filters.len(), 3);
/// assert_eq!(registries.mutators.len(), 3);
/// assert_eq!(registries.handlers.len(), 1);
/// ```
pub struct AdapterRegistryBuilder {
    gateway: StoreGateway,
    executor: Arc<dyn Executor>,
    execution: ExecutionConfig,
    evaluator: Option<Arc<dyn FilterEvaluator>>,
}

impl AdapterRegistryBuilder {
    /// Create a builder over a store gateway and command executor
    pub fn new(gateway: StoreGateway, executor: Arc<dyn Executor>) -> Self {
        Self {
            gateway,
            executor,
            execution: ExecutionConfig::default(),
            evaluator: None,
        }
    }

    /// Set the execution configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Timeouts for pipe commands and socket delivery
    ///
    /// # Returns
    ///
    /// Returns self for method chaining
    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        self.execution = config;
        self
    }

    /// Enable stored event filters, evaluated with `evaluator`
    ///
    /// Without an evaluator only the built-in filters are available.
    ///
    /// # Returns
    ///
    /// Returns self for method chaining
    pub fn with_filter_evaluator(mut self, evaluator: Arc<dyn FilterEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Build the registries
    pub fn build(&self) -> AdapterRegistries {
        let default_timeout = Duration::from_secs(self.execution.default_timeout_secs);
        let socket_timeout = Duration::from_secs(self.execution.socket_timeout_secs);

        let mut filters = FilterRegistry::new("filter")
            .with(Arc::new(HasMetrics))
            .with(Arc::new(IsIncident))
            .with(Arc::new(NotSilenced));
        if let Some(evaluator) = &self.evaluator {
            filters.register(Arc::new(LegacyFilterAdapter::new(
                self.gateway.clone(),
                evaluator.clone(),
            )));
        }

        let mutators = MutatorRegistry::new("mutator")
            .with(Arc::new(JsonMutator))
            .with(Arc::new(OnlyCheckOutput))
            .with(Arc::new(LegacyMutatorAdapter::new(
                self.gateway.clone(),
                self.executor.clone(),
                default_timeout,
            )));

        let handlers = HandlerRegistry::new("handler").with(Arc::new(
            LegacyHandlerAdapter::new(self.gateway.clone(), self.executor.clone(), default_timeout)
                .with_socket_timeout(socket_timeout),
        ));

        AdapterRegistries {
            filters,
            mutators,
            handlers,
        }
    }
}
