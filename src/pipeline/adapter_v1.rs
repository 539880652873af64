//! The workflow executor
//!
//! [`AdapterV1`] is the pipeline adapter for `Pipeline` references. A run
//! resolves the pipeline, then walks its workflows in order: filters,
//! mutator, handler. A failing workflow does not stop the ones after it;
//! failures are collected and returned together once every workflow had
//! its turn.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::mutator::default_mutator;
use super::registry_builder::AdapterRegistries;
use super::resolver::PipelineResolver;
use super::{
    Adapter, FilterAdapter, FilterRegistry, HandlerAdapter, HandlerRegistry, MutatorAdapter,
    MutatorRegistry, PipelineAdapter,
};
use crate::error::{is_cancellation, PipelineError, Result, RunFailures};
use crate::metrics::{RunMetrics, WorkflowOutcome};
use crate::resources::{Event, Pipeline, PipelineWorkflow, Resource, ResourceReference};
use crate::store::StoreGateway;

const ADAPTER_NAME: &str = "AdapterV1";

/// Runs stored and legacy pipelines
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use eventpipe::executor::ProcessExecutor;
/// use eventpipe::pipeline::{Adapter, AdapterRegistryBuilder, AdapterV1};
/// use eventpipe::resources::ResourceReference;
/// use eventpipe::store::{MemoryStore, StoreGateway};
///
/// let gateway = StoreGateway::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
/// let registries = AdapterRegistryBuilder::new(gateway.clone(), Arc::new(ProcessExecutor::new())).build();
/// let adapter = AdapterV1::new(gateway, registries);
///
/// assert_eq!(adapter.name(), "AdapterV1");
/// assert!(adapter.can_handle(&ResourceReference::pipeline("incidents")));
/// assert!(!adapter.can_handle(&ResourceReference::handler("slack")));
/// ```
pub struct AdapterV1 {
    resolver: PipelineResolver,
    filters: FilterRegistry,
    mutators: MutatorRegistry,
    handlers: HandlerRegistry,
}

impl AdapterV1 {
    /// Create the executor over a store gateway and adapter registries
    pub fn new(gateway: StoreGateway, registries: AdapterRegistries) -> Self {
        Self {
            resolver: PipelineResolver::new(gateway),
            filters: registries.filters,
            mutators: registries.mutators,
            handlers: registries.handlers,
        }
    }

    /// Set the maximum handler set depth for legacy pipelines
    pub fn with_max_handler_set_depth(mut self, max_depth: usize) -> Self {
        self.resolver = self.resolver.with_max_depth(max_depth);
        self
    }

    /// Resolve the pipeline a run would execute, without executing it
    ///
    /// # Errors
    ///
    /// See [`PipelineResolver::resolve`].
    pub async fn resolve_pipeline(
        &self,
        ctx: &CancellationToken,
        reference: Option<&ResourceReference>,
        event: &Event,
    ) -> Result<Pipeline> {
        self.resolver.resolve(ctx, reference, event).await
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        reference: Option<&ResourceReference>,
        event: &Event,
        metrics: &RunMetrics,
    ) -> Result<()> {
        let pipeline = self.resolver.resolve(ctx, reference, event).await?;

        let mut failures = RunFailures::default();
        for workflow in &pipeline.workflows {
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }

            match self.run_workflow(ctx, workflow, event).await {
                Ok(outcome) => metrics.record_workflow(outcome),
                Err(e) if is_cancellation(&e) => return Err(e),
                Err(e) => {
                    tracing::error!(
                        pipeline = %pipeline.name(),
                        workflow = %workflow.name,
                        error = %e,
                        "workflow failed"
                    );
                    metrics.record_workflow(WorkflowOutcome::Failed);
                    failures.push(workflow.name.clone(), e);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Workflows(failures).into())
        }
    }

    async fn run_workflow(
        &self,
        ctx: &CancellationToken,
        workflow: &PipelineWorkflow,
        event: &Event,
    ) -> Result<WorkflowOutcome> {
        for reference in &workflow.filters {
            let filter = self.filters.dispatch(reference)?;
            if filter.filter(ctx, reference, event).await? {
                tracing::debug!(
                    workflow = %workflow.name,
                    filter = %reference.name,
                    adapter = filter.name(),
                    "event denied by filter"
                );
                return Ok(WorkflowOutcome::Filtered);
            }
        }

        let default = default_mutator();
        let mutator_ref = workflow.mutator.as_ref().unwrap_or(&default);
        let mutator = self.mutators.dispatch(mutator_ref)?;
        let payload = mutator.mutate(ctx, mutator_ref, event).await?;

        let handler = self.handlers.dispatch(&workflow.handler)?;
        handler
            .handle(ctx, &workflow.handler, event, &payload)
            .await?;

        tracing::debug!(
            workflow = %workflow.name,
            mutator = %mutator_ref.name,
            handler = %workflow.handler.name,
            bytes = payload.len(),
            "workflow executed"
        );
        Ok(WorkflowOutcome::Executed)
    }
}

impl Adapter for AdapterV1 {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.is_pipeline()
    }
}

#[async_trait]
impl PipelineAdapter for AdapterV1 {
    async fn run(
        &self,
        ctx: &CancellationToken,
        reference: Option<&ResourceReference>,
        resource: &Resource,
    ) -> Result<()> {
        let event = resource.as_event().ok_or(PipelineError::NotAnEvent)?;

        let metrics = RunMetrics::start(ADAPTER_NAME);
        let result = self.execute(ctx, reference, event, &metrics).await;
        match &result {
            Ok(()) => metrics.record_success(),
            Err(e) if is_cancellation(e) => metrics.record_cancelled(),
            Err(_) => metrics.record_failure(),
        }
        result
    }

    fn runs_legacy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::pipeline::mutator::JsonMutator;
    use crate::resources::Handler;
    use crate::test_utils::{
        assert_error_contains, fixture_event, fixture_handler, fixture_legacy_event,
        fixture_pipeline, fixture_pipeline_reference, RecordingExecutor, RecordingHandler,
        ScriptedStore, StaticFilter,
    };

    fn gateway(store: ScriptedStore) -> StoreGateway {
        StoreGateway::new(Arc::new(store), Duration::from_secs(1))
    }

    fn registries(handler: Arc<RecordingHandler>) -> AdapterRegistries {
        AdapterRegistries {
            filters: FilterRegistry::new("filter"),
            mutators: MutatorRegistry::new("mutator").with(Arc::new(JsonMutator)),
            handlers: HandlerRegistry::new("handler").with(handler),
        }
    }

    fn event_resource() -> Resource {
        Resource::Event(fixture_event("entity1", "check1"))
    }

    async fn run_pipeline(adapter: &AdapterV1, name: &str, resource: &Resource) -> Result<()> {
        adapter
            .run(
                &CancellationToken::new(),
                Some(&fixture_pipeline_reference(name)),
                resource,
            )
            .await
    }

    #[test]
    fn test_can_handle_only_pipelines() {
        let adapter = AdapterV1::new(gateway(ScriptedStore::new()), AdapterRegistries::empty());
        assert_eq!(adapter.name(), "AdapterV1");
        assert!(adapter.can_handle(&ResourceReference::pipeline("pipeline1")));
        assert!(!adapter.can_handle(&ResourceReference::handler("pipeline1")));
        assert!(!adapter.can_handle(&ResourceReference::event_filter("pipeline1")));
        assert!(adapter.runs_legacy());
    }

    #[tokio::test]
    async fn test_resource_is_not_an_event() {
        let adapter = AdapterV1::new(gateway(ScriptedStore::new()), AdapterRegistries::empty());
        let result = run_pipeline(
            &adapter,
            "pipeline1",
            &Resource::Handler(fixture_handler("handler1")),
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "resource is not an Event");
    }

    #[tokio::test]
    async fn test_pipeline_fetch_internal_error() {
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().failing_with("etcd timeout")),
            AdapterRegistries::empty(),
        );
        let result = run_pipeline(&adapter, "pipeline1", &event_resource()).await;
        assert_eq!(result.unwrap_err().to_string(), "internal error: etcd timeout");
    }

    #[tokio::test]
    async fn test_pipeline_does_not_exist() {
        let adapter = AdapterV1::new(gateway(ScriptedStore::new()), AdapterRegistries::empty());
        let result = run_pipeline(&adapter, "pipeline1", &event_resource()).await;
        assert_eq!(result.unwrap_err().to_string(), "pipeline does not exist");
    }

    #[tokio::test]
    async fn test_pipeline_has_no_workflows() {
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(Pipeline::new("pipeline1", "default"))),
            AdapterRegistries::empty(),
        );
        let result = run_pipeline(&adapter, "pipeline1", &event_resource()).await;
        assert_eq!(result.unwrap_err().to_string(), "pipeline has no workflows");
    }

    #[tokio::test]
    async fn test_handler_fetch_failure() {
        let gateway = gateway(
            ScriptedStore::new()
                .with_pipeline(fixture_pipeline("pipeline1", &["handler1"]))
                .failing_handlers_with("etcd timeout"),
        );
        let registries = crate::pipeline::AdapterRegistryBuilder::new(
            gateway.clone(),
            Arc::new(RecordingExecutor::new(0, "")),
        )
        .build();
        let adapter = AdapterV1::new(gateway, registries);

        let result = run_pipeline(&adapter, "pipeline1", &event_resource()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "failed to fetch handler from store: internal error: etcd timeout"
        );
    }

    #[tokio::test]
    async fn test_handler_invoked_once_with_json_payload() {
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(fixture_pipeline("pipeline1", &["handler1"]))),
            registries(handler.clone()),
        );
        let resource = event_resource();

        run_pipeline(&adapter, "pipeline1", &resource).await.unwrap();

        assert_eq!(handler.calls(), 1);
        let payloads = handler.payloads();
        assert_eq!(payloads[0].0, "handler1");
        let expected = serde_json::to_vec(resource.as_event().unwrap()).unwrap();
        assert_eq!(payloads[0].1, expected);
    }

    #[tokio::test]
    async fn test_first_filter_denies() {
        let mut pipeline = fixture_pipeline("pipeline1", &["handler1"]);
        pipeline.workflows[0].filters = vec![
            ResourceReference::event_filter("filter1"),
            ResourceReference::event_filter("filter2"),
        ];
        let first = StaticFilter::denying("filter1");
        let second = StaticFilter::allowing("filter2");
        let handler = RecordingHandler::new();
        let mut registries = registries(handler.clone());
        registries.filters = FilterRegistry::new("filter")
            .with(first.clone())
            .with(second.clone());

        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(pipeline)),
            registries,
        );

        run_pipeline(&adapter, "pipeline1", &event_resource()).await.unwrap();
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_allowed_filters_reach_handler() {
        let mut pipeline = fixture_pipeline("pipeline1", &["handler1"]);
        pipeline.workflows[0].filters = vec![ResourceReference::event_filter("filter1")];
        let handler = RecordingHandler::new();
        let mut registries = registries(handler.clone());
        registries.filters = FilterRegistry::new("filter").with(StaticFilter::allowing("filter1"));

        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(pipeline)),
            registries,
        );

        run_pipeline(&adapter, "pipeline1", &event_resource()).await.unwrap();
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_filter_error_fails_only_its_workflow() {
        let mut pipeline = fixture_pipeline("pipeline1", &["handler1", "handler2"]);
        pipeline.workflows[0].filters = vec![ResourceReference::event_filter("flaky")];
        let flaky = StaticFilter::failing("flaky", "expression evaluation failed");
        let handler = RecordingHandler::new();
        let mut registries = registries(handler.clone());
        registries.filters = FilterRegistry::new("filter").with(flaky.clone());

        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(pipeline)),
            registries,
        );

        let err = run_pipeline(&adapter, "pipeline1", &event_resource())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "expression evaluation failed");
        assert_eq!(flaky.calls(), 1);

        let names: Vec<_> = handler.payloads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["handler2"]);
    }

    #[tokio::test]
    async fn test_failing_workflow_does_not_stop_the_others() {
        let mut pipeline = fixture_pipeline("pipeline1", &["handler1", "handler2", "handler3"]);
        pipeline.workflows[1].mutator = Some(ResourceReference::mutator("unknown"));
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(pipeline)),
            registries(handler.clone()),
        );

        let err = run_pipeline(&adapter, "pipeline1", &event_resource())
            .await
            .unwrap_err();
        assert_eq!(handler.calls(), 2);
        assert!(err
            .to_string()
            .starts_with("unsupported resource reference core/v2.Mutator(unknown)"));
    }

    #[tokio::test]
    async fn test_multiple_failures_are_aggregated() {
        let handler = RecordingHandler::failing("connection refused");
        let adapter = AdapterV1::new(
            gateway(
                ScriptedStore::new()
                    .with_pipeline(fixture_pipeline("pipeline1", &["handler1", "handler2"])),
            ),
            registries(handler.clone()),
        );

        let err = run_pipeline(&adapter, "pipeline1", &event_resource())
            .await
            .unwrap_err();
        assert_eq!(handler.calls(), 2);
        assert_eq!(
            err.to_string(),
            "2 failures: send to handler1: connection refused; send to handler2: connection refused"
        );
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Workflows(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("expected workflow failures, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_legacy_event_runs_expanded_handlers() {
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(
                ScriptedStore::new()
                    .with_handler(Handler::set("ops", &["slack", "pagerduty"]))
                    .with_handler(fixture_handler("slack"))
                    .with_handler(fixture_handler("pagerduty")),
            ),
            registries(handler.clone()),
        );

        let resource = Resource::Event(fixture_legacy_event(2, &["ops", "slack"]));
        adapter
            .run(&CancellationToken::new(), None, &resource)
            .await
            .unwrap();

        let names: Vec<_> = handler.payloads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["pagerduty", "slack"]);
    }

    #[tokio::test]
    async fn test_legacy_event_depth_exceeded() {
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(
                ScriptedStore::new()
                    .with_handler(Handler::set("a", &["b"]))
                    .with_handler(Handler::set("b", &["c"]))
                    .with_handler(fixture_handler("c")),
            ),
            registries(handler.clone()),
        )
        .with_max_handler_set_depth(2);

        let resource = Resource::Event(fixture_legacy_event(2, &["a"]));
        let result = adapter.run(&CancellationToken::new(), None, &resource).await;
        assert_error_contains(result, "maximum handler set expansion depth exceeded");
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(fixture_pipeline("pipeline1", &["handler1"]))),
            registries(handler.clone()),
        );
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = adapter
            .run(&ctx, Some(&fixture_pipeline_reference("pipeline1")), &event_resource())
            .await
            .unwrap_err();
        assert!(is_cancellation(&err));
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_event_is_not_modified() {
        let handler = RecordingHandler::new();
        let adapter = AdapterV1::new(
            gateway(ScriptedStore::new().with_pipeline(fixture_pipeline("pipeline1", &["handler1"]))),
            registries(handler),
        );
        let resource = event_resource();
        let before = resource.clone();

        run_pipeline(&adapter, "pipeline1", &resource).await.unwrap();
        assert_eq!(resource, before);
    }
}
