//! The `only_check_output` built-in mutator

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::pipeline::{Adapter, MutatorAdapter};
use crate::resources::{Event, ResourceReference};

/// Mutator name served by [`OnlyCheckOutput`]
pub const MUTATOR_NAME: &str = "only_check_output";

/// Hands the handler the raw check output
#[derive(Debug, Default, Clone, Copy)]
pub struct OnlyCheckOutput;

impl Adapter for OnlyCheckOutput {
    fn name(&self) -> &str {
        "OnlyCheckOutputAdapter"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        super::is_builtin(reference, MUTATOR_NAME)
    }
}

#[async_trait]
impl MutatorAdapter for OnlyCheckOutput {
    async fn mutate(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        event: &Event,
    ) -> Result<Vec<u8>> {
        let check = event.check.as_ref().ok_or_else(|| {
            PipelineError::Execution(format!(
                "{} mutator requires an event with a check",
                MUTATOR_NAME
            ))
        })?;
        Ok(check.output.clone().into_bytes())
    }
}
