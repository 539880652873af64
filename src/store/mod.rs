//! Configuration store boundary
//!
//! The engine never owns configuration: pipelines, handlers, mutators and
//! event filters are fetched by name through the [`Store`] trait. Every
//! fetch goes through the [`StoreGateway`], which bounds the call with the
//! configured timeout, races it against the caller's cancellation token and
//! normalizes "no error, no result" into [`StoreError::NotFound`].
//!
//! - [`memory::MemoryStore`] -- in-process store, loadable from a YAML
//!   resource file.

pub mod memory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::resources::{EventFilter, Handler, Mutator, Pipeline};

pub use memory::MemoryStore;

/// Result of a raw store lookup: `Ok(None)` when nothing is stored
pub type StoreResult<T> = std::result::Result<Option<T>, StoreError>;

/// Read access to the configuration store
///
/// Implementations return `Ok(None)` for absent resources and
/// [`StoreError::Internal`] when the store itself fails.
///
/// # Examples
///
/// ```
/// use eventpipe::store::{MemoryStore, Store};
/// use eventpipe::resources::Handler;
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.put_handler(Handler::pipe("slack", "slack-notify"));
///
/// let handler = store.get_handler_by_name("slack").await.unwrap();
/// assert!(handler.is_some());
/// # }
/// ```
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a pipeline by name
    async fn get_pipeline_by_name(&self, name: &str) -> StoreResult<Pipeline>;

    /// Fetch a handler by name
    async fn get_handler_by_name(&self, name: &str) -> StoreResult<Handler>;

    /// Fetch a mutator by name
    async fn get_mutator_by_name(&self, name: &str) -> StoreResult<Mutator>;

    /// Fetch an event filter by name
    async fn get_event_filter_by_name(&self, name: &str) -> StoreResult<EventFilter>;
}

/// Bounded-time access to a [`Store`]
///
/// Stateless per call and cheap to clone; adapters that fetch their own
/// resources each hold a clone.
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl StoreGateway {
    /// Create a gateway over a store with a per-call timeout
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch a pipeline, mapping absence to `"pipeline does not exist"`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], [`StoreError::Internal`] (including
    /// timeouts) or [`StoreError::Cancelled`].
    pub async fn fetch_pipeline(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Pipeline, StoreError> {
        self.bounded(ctx, "pipeline", name, self.store.get_pipeline_by_name(name))
            .await
    }

    /// Fetch a handler, mapping absence to `"handler does not exist"`
    ///
    /// # Errors
    ///
    /// See [`StoreGateway::fetch_pipeline`].
    pub async fn fetch_handler(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Handler, StoreError> {
        self.bounded(ctx, "handler", name, self.store.get_handler_by_name(name))
            .await
    }

    /// Fetch a mutator, mapping absence to `"mutator does not exist"`
    ///
    /// # Errors
    ///
    /// See [`StoreGateway::fetch_pipeline`].
    pub async fn fetch_mutator(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Mutator, StoreError> {
        self.bounded(ctx, "mutator", name, self.store.get_mutator_by_name(name))
            .await
    }

    /// Fetch an event filter, mapping absence to `"event filter does not exist"`
    ///
    /// # Errors
    ///
    /// See [`StoreGateway::fetch_pipeline`].
    pub async fn fetch_event_filter(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<EventFilter, StoreError> {
        self.bounded(
            ctx,
            "event filter",
            name,
            self.store.get_event_filter_by_name(name),
        )
        .await
    }

    async fn bounded<T, F>(
        &self,
        ctx: &CancellationToken,
        kind: &'static str,
        name: &str,
        request: F,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                tracing::debug!(kind, name, "store request cancelled");
                return Err(StoreError::Cancelled);
            }
            response = tokio::time::timeout(self.timeout, request) => response,
        };

        match response {
            Ok(Ok(Some(resource))) => Ok(resource),
            Ok(Ok(None)) => Err(StoreError::NotFound {
                kind,
                name: name.to_string(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(kind, name, timeout = ?self.timeout, "store request timed out");
                Err(StoreError::internal(format!(
                    "context deadline exceeded after {:?} fetching {} {}",
                    self.timeout, kind, name
                )))
            }
        }
    }
}

impl std::fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
