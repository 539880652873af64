//! The `not_silenced` built-in filter

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::pipeline::{Adapter, FilterAdapter};
use crate::resources::{Event, ResourceReference};

/// Event filter name served by [`NotSilenced`]
pub const FILTER_NAME: &str = "not_silenced";

/// Denies events whose check is silenced
#[derive(Debug, Default, Clone, Copy)]
pub struct NotSilenced;

impl Adapter for NotSilenced {
    fn name(&self) -> &str {
        "NotSilenced"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        super::is_builtin(reference, FILTER_NAME)
    }
}

#[async_trait]
impl FilterAdapter for NotSilenced {
    async fn filter(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        event: &Event,
    ) -> Result<bool> {
        if event.is_silenced() {
            tracing::debug!(entity = %event.entity.metadata.name, "event is silenced");
            return Ok(true);
        }
        Ok(false)
    }
}
