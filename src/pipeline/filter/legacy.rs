//! Store-backed event filter adapter

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::BUILTIN_FILTERS;
use crate::error::{PipelineError, Result};
use crate::pipeline::{Adapter, FilterAdapter};
use crate::resources::{kind, Event, EventFilter, FilterAction, ResourceReference};
use crate::store::StoreGateway;

/// Evaluates one stored filter expression against an event
pub trait FilterEvaluator: Send + Sync {
    /// Returns true when the expression matches the event
    ///
    /// # Errors
    ///
    /// Returns an error when the expression cannot be evaluated.
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool>;
}

impl<T: FilterEvaluator + ?Sized> FilterEvaluator for Arc<T> {
    fn evaluate(&self, expression: &str, event: &Event) -> Result<bool> {
        (**self).evaluate(expression, event)
    }
}

/// Serves every `core/v2` event filter that is not a built-in
///
/// The filter definition is fetched from the store on every call. An event
/// matches when all expressions are true; an `allow` filter denies events
/// that do not match, a `deny` filter denies events that do.
#[derive(Debug)]
pub struct LegacyFilterAdapter<E> {
    gateway: StoreGateway,
    evaluator: E,
}

impl<E: FilterEvaluator> LegacyFilterAdapter<E> {
    pub fn new(gateway: StoreGateway, evaluator: E) -> Self {
        Self { gateway, evaluator }
    }

    fn matches(&self, filter: &EventFilter, event: &Event) -> Result<bool> {
        for expression in &filter.expressions {
            if !self.evaluator.evaluate(expression, event)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<E: FilterEvaluator> Adapter for LegacyFilterAdapter<E> {
    fn name(&self) -> &str {
        "LegacyFilterAdapter"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.api_version == crate::resources::CORE_API_VERSION
            && reference.is_type(kind::EVENT_FILTER)
            && !BUILTIN_FILTERS.contains(&reference.name.as_str())
    }
}

#[async_trait]
impl<E: FilterEvaluator> FilterAdapter for LegacyFilterAdapter<E> {
    async fn filter(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
    ) -> Result<bool> {
        let filter = self
            .gateway
            .fetch_event_filter(ctx, &reference.name)
            .await
            .map_err(PipelineError::FilterFetch)?;

        let matched = self.matches(&filter, event)?;
        let denied = match filter.action {
            FilterAction::Allow => !matched,
            FilterAction::Deny => matched,
        };
        tracing::debug!(
            filter = %filter.metadata.name,
            action = ?filter.action,
            matched,
            denied,
            "evaluated event filter"
        );
        Ok(denied)
    }
}
