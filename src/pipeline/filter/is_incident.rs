//! The `is_incident` built-in filter

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::pipeline::{Adapter, FilterAdapter};
use crate::resources::{Event, ResourceReference};

/// Event filter name served by [`IsIncident`]
pub const FILTER_NAME: &str = "is_incident";

/// Allows incidents and resolutions, denies everything else
///
/// Resolutions pass so handlers learn that an incident is over.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsIncident;

impl Adapter for IsIncident {
    fn name(&self) -> &str {
        "IsIncident"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        super::is_builtin(reference, FILTER_NAME)
    }
}

#[async_trait]
impl FilterAdapter for IsIncident {
    async fn filter(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        event: &Event,
    ) -> Result<bool> {
        Ok(!(event.is_incident() || event.is_resolution()))
    }
}
