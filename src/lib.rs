//! eventpipe - monitoring event pipeline engine
//!
//! This library resolves the pipeline an incoming monitoring event should
//! go through and runs it: for every workflow a filter chain, a payload
//! mutator and a handler, each served by the first registered adapter that
//! declares it can handle the workflow's resource reference.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `resources`: Events, pipelines, handlers, mutators, event filters
//! - `store`: Store boundary, bounded-time gateway and in-memory store
//! - `pipeline`: Adapters, capability dispatch, handler set expansion,
//!   pipeline resolution and the workflow executor
//! - `pipelined`: Event intake routing events to pipeline adapters
//! - `executor`: Command execution for pipe handlers and mutators
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging setup
//! - `metrics`: Pipeline run metrics
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use eventpipe::executor::ProcessExecutor;
//! use eventpipe::pipeline::{AdapterRegistryBuilder, AdapterV1, PipelineRegistry};
//! use eventpipe::pipelined::Pipelined;
//! use eventpipe::store::{MemoryStore, StoreGateway};
//! use eventpipe::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let store = MemoryStore::load("resources.yaml")?;
//!     let gateway = StoreGateway::new(Arc::new(store), config.pipeline.store_timeout());
//!     let registries =
//!         AdapterRegistryBuilder::new(gateway.clone(), Arc::new(ProcessExecutor::new())).build();
//!     let adapters =
//!         PipelineRegistry::new("pipeline").with(Arc::new(AdapterV1::new(gateway, registries)));
//!
//!     let pipelined = Arc::new(Pipelined::new(adapters).with_config(&config.pipelined));
//!     let (_events, receiver) = pipelined.channel();
//!     pipelined.run(Default::default(), receiver).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod pipelined;
pub mod resources;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{PipelineError, Result, StoreError};
pub use pipeline::AdapterV1;
pub use pipelined::Pipelined;
pub use resources::{Event, ResourceReference};

#[cfg(test)]
pub mod test_utils;
