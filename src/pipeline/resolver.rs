//! Pipeline resolution
//!
//! A run either names a stored pipeline, or carries no pipeline reference at
//! all, in which case an ephemeral pipeline is synthesized from the handler
//! names on the event's check and metrics. Synthesized pipelines are never
//! written back to the store.

use tokio_util::sync::CancellationToken;

use super::expand::HandlerExpander;
use crate::error::{PipelineError, Result};
use crate::resources::{Event, Handler, Pipeline, PipelineWorkflow, ResourceReference};
use crate::store::StoreGateway;

/// Name of every synthesized legacy pipeline
pub const LEGACY_PIPELINE_NAME: &str = "legacy-pipeline";

/// Produces the concrete pipeline a run executes
#[derive(Debug, Clone)]
pub struct PipelineResolver {
    gateway: StoreGateway,
    expander: HandlerExpander,
}

impl PipelineResolver {
    /// Create a resolver with the default handler set depth
    pub fn new(gateway: StoreGateway) -> Self {
        Self {
            expander: HandlerExpander::new(gateway.clone()),
            gateway,
        }
    }

    /// Set the maximum handler set depth followed during synthesis
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.expander = self.expander.with_max_depth(max_depth);
        self
    }

    /// Handler expander used for legacy pipelines
    pub fn expander(&self) -> &HandlerExpander {
        &self.expander
    }

    /// Resolve the pipeline for a run
    ///
    /// A pipeline reference is fetched from the store; anything else yields
    /// the legacy pipeline of `event`.
    ///
    /// # Errors
    ///
    /// - store errors, rendered verbatim ("pipeline does not exist",
    ///   "internal error: ...")
    /// - [`PipelineError::NoWorkflows`] when the pipeline is empty
    /// - for legacy pipelines that came out empty, the first problem met
    ///   during expansion, such as [`PipelineError::DepthExceeded`]
    pub async fn resolve(
        &self,
        ctx: &CancellationToken,
        reference: Option<&ResourceReference>,
        event: &Event,
    ) -> Result<Pipeline> {
        let pipeline = match reference {
            Some(reference) if reference.is_pipeline() => {
                let pipeline = self
                    .gateway
                    .fetch_pipeline(ctx, &reference.name)
                    .await
                    .map_err(PipelineError::Store)?;
                tracing::debug!(
                    pipeline = %pipeline.name(),
                    workflows = pipeline.workflows.len(),
                    "resolved stored pipeline"
                );
                pipeline
            }
            _ => self.legacy_pipeline(ctx, event).await?,
        };

        if pipeline.workflows.is_empty() {
            return Err(PipelineError::NoWorkflows.into());
        }
        Ok(pipeline)
    }

    async fn legacy_pipeline(&self, ctx: &CancellationToken, event: &Event) -> Result<Pipeline> {
        let names = event.legacy_handler_names();
        let expansion = self.expander.expand(ctx, &names).await?;

        let mut pipeline = Pipeline::new(LEGACY_PIPELINE_NAME, event.namespace());
        pipeline.workflows = expansion
            .handlers
            .values()
            .map(|handler| legacy_workflow(event, handler))
            .collect();

        if pipeline.workflows.is_empty() {
            if let Some(first) = expansion.errors.into_iter().next() {
                return Err(first.into());
            }
        }

        tracing::debug!(
            handlers = ?names,
            workflows = pipeline.workflows.len(),
            "synthesized legacy pipeline"
        );
        Ok(pipeline)
    }
}

fn legacy_workflow(event: &Event, handler: &Handler) -> PipelineWorkflow {
    let mut workflow = PipelineWorkflow::new(
        format!("legacy-pipeline-workflow-{}", handler.name()),
        ResourceReference::handler(handler.name()),
    );

    for name in event.filters.iter().chain(handler.filters.iter()) {
        let reference = ResourceReference::event_filter(name.as_str());
        if !workflow.filters.contains(&reference) {
            workflow.filters.push(reference);
        }
    }

    workflow.mutator = event
        .mutator
        .as_ref()
        .or(handler.mutator.as_ref())
        .filter(|name| !name.is_empty())
        .map(|name| ResourceReference::mutator(name.as_str()));

    workflow
}
