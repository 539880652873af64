//! The `json` built-in mutator

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::pipeline::{Adapter, MutatorAdapter};
use crate::resources::{Event, ResourceReference};

/// Mutator name served by [`JsonMutator`]
pub const MUTATOR_NAME: &str = "json";

/// Encodes the event as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMutator;

impl Adapter for JsonMutator {
    fn name(&self) -> &str {
        "JSONAdapter"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        super::is_builtin(reference, MUTATOR_NAME)
    }
}

#[async_trait]
impl MutatorAdapter for JsonMutator {
    async fn mutate(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        event: &Event,
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(event).map_err(PipelineError::Serialization)?)
    }
}
