//! The `has_metrics` built-in filter

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::pipeline::{Adapter, FilterAdapter};
use crate::resources::{Event, ResourceReference};

/// Event filter name served by [`HasMetrics`]
pub const FILTER_NAME: &str = "has_metrics";

/// Denies events that carry no metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct HasMetrics;

impl Adapter for HasMetrics {
    fn name(&self) -> &str {
        "HasMetrics"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        super::is_builtin(reference, FILTER_NAME)
    }
}

#[async_trait]
impl FilterAdapter for HasMetrics {
    async fn filter(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        event: &Event,
    ) -> Result<bool> {
        Ok(!event.has_metrics())
    }
}
