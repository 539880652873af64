//! Legacy handler set expansion
//!
//! A legacy event names handlers directly. A `set` handler only names other
//! handlers, and sets may contain sets, so the names are expanded
//! recursively into the leaf handlers that actually run.
//!
//! The store does not forbid a set from naming itself, so recursion is
//! bounded by depth rather than by cycle detection: the top-level names are
//! at level 1 and a set whose members would land past the ceiling is not
//! expanded. A legal but very deep chain is refused the same way a cycle is.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use super::HandlerMap;
use crate::error::{PipelineError, Result};
use crate::store::StoreGateway;

/// Default maximum handler set nesting
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Outcome of an expansion
///
/// Per-name problems (a missing handler, a set nested too deeply) do not
/// stop the expansion; they are collected in `errors` while the other names
/// are still resolved.
#[derive(Debug, Default)]
pub struct HandlerExpansion {
    /// Leaf handlers by name
    pub handlers: HandlerMap,
    /// Problems that caused a name or a branch to be skipped, in the order
    /// they were met
    pub errors: Vec<PipelineError>,
}

impl HandlerExpansion {
    /// Returns true when any branch hit the depth ceiling
    pub fn depth_exceeded(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, PipelineError::DepthExceeded { .. }))
    }
}

/// Resolves handler names into leaf handlers through the store
#[derive(Debug, Clone)]
pub struct HandlerExpander {
    gateway: StoreGateway,
    max_depth: usize,
}

type ExpandFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

impl HandlerExpander {
    /// Create an expander with the default depth ceiling
    pub fn new(gateway: StoreGateway) -> Self {
        Self {
            gateway,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the depth ceiling
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Depth ceiling
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Expand top-level handler names
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerFetch`] when the store fails for any
    /// name (including cancellation); a missing handler is only recorded.
    pub async fn expand(
        &self,
        ctx: &CancellationToken,
        names: &[String],
    ) -> Result<HandlerExpansion> {
        self.expand_at(ctx, names, 1).await
    }

    /// Expand names as if found at `level`
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DepthExceeded`] when `level` is already past
    /// the ceiling, plus the errors of [`HandlerExpander::expand`].
    pub async fn expand_at(
        &self,
        ctx: &CancellationToken,
        names: &[String],
        level: usize,
    ) -> Result<HandlerExpansion> {
        if level > self.max_depth {
            return Err(PipelineError::DepthExceeded {
                limit: self.max_depth,
            }
            .into());
        }

        let mut expansion = HandlerExpansion::default();
        self.expand_into(ctx, names, level, &mut expansion).await?;
        tracing::debug!(
            requested = names.len(),
            resolved = expansion.handlers.len(),
            skipped = expansion.errors.len(),
            "expanded handlers"
        );
        Ok(expansion)
    }

    fn expand_into<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        names: &'a [String],
        level: usize,
        expansion: &'a mut HandlerExpansion,
    ) -> ExpandFuture<'a> {
        Box::pin(async move {
            for name in names {
                let handler = match self.gateway.fetch_handler(ctx, name).await {
                    Ok(handler) => handler,
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(handler = %name, level, "handler does not exist, skipping");
                        expansion.errors.push(PipelineError::HandlerFetch(e));
                        continue;
                    }
                    Err(e) => return Err(PipelineError::HandlerFetch(e).into()),
                };

                if !handler.is_set() {
                    expansion
                        .handlers
                        .entry(handler.metadata.name.clone())
                        .or_insert(handler);
                    continue;
                }

                if level + 1 > self.max_depth {
                    tracing::warn!(
                        handler = %name,
                        level,
                        limit = self.max_depth,
                        "handler set nested too deeply, not expanding"
                    );
                    expansion.errors.push(PipelineError::DepthExceeded {
                        limit: self.max_depth,
                    });
                    continue;
                }

                self.expand_into(ctx, &handler.handlers, level + 1, expansion)
                    .await?;
            }
            Ok(())
        })
    }
}
