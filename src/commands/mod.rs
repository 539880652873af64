//! Command handlers for the CLI
//!
//! Every command loads a YAML resource file into a [`MemoryStore`] and works
//! against it through a [`StoreGateway`]:
//!
//! - `run`: route one event through its pipelines
//! - `expand`: show the leaf handlers a list of handler names expands to
//! - `validate`: parse and validate the resource file

pub mod expand;
pub mod run;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::store::{MemoryStore, StoreGateway};

/// Load a resource file and wrap it in a gateway bounded by the configured
/// store timeout
///
/// # Errors
///
/// Returns an error if the file cannot be read or a document is invalid.
pub fn load_gateway(resources: &Path, config: &Config) -> Result<StoreGateway> {
    let store = MemoryStore::load(resources)?;
    tracing::info!(
        path = %resources.display(),
        resources = store.len(),
        "loaded resource file"
    );
    Ok(StoreGateway::new(
        Arc::new(store),
        config.pipeline.store_timeout(),
    ))
}
