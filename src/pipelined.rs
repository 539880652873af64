//! Event intake service
//!
//! [`Pipelined`] routes every event to the pipeline adapters that should
//! process it: one run per pipeline reference the event carries, plus a
//! legacy run when the event names handlers directly. Events arrive over a
//! bounded channel and are processed concurrently, up to the configured
//! number of workers.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{PipelinedConfig, MAX_WORKERS};
use crate::error::{is_cancellation, PipelineError, Result, RunFailures};
use crate::pipeline::{Adapter, PipelineAdapter, PipelineRegistry, LEGACY_PIPELINE_NAME};
use crate::resources::{Event, Resource, ResourceReference};

/// Dispatches events to pipeline adapters
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use eventpipe::executor::ProcessExecutor;
/// use eventpipe::pipeline::{AdapterRegistryBuilder, AdapterV1, PipelineRegistry};
/// use eventpipe::pipelined::Pipelined;
/// use eventpipe::store::{MemoryStore, StoreGateway};
///
/// let gateway = StoreGateway::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
/// let registries = AdapterRegistryBuilder::new(gateway.clone(), Arc::new(ProcessExecutor::new())).build();
/// let adapters = PipelineRegistry::new("pipeline").with(Arc::new(AdapterV1::new(gateway, registries)));
///
/// let pipelined = Pipelined::new(adapters);
/// assert_eq!(pipelined.workers(), 100);
/// ```
pub struct Pipelined {
    adapters: PipelineRegistry,
    workers: usize,
    buffer_size: usize,
}

impl Pipelined {
    /// Create the service with default worker and buffer sizes
    pub fn new(adapters: PipelineRegistry) -> Self {
        let defaults = PipelinedConfig::default();
        Self {
            adapters,
            workers: defaults.workers,
            buffer_size: defaults.buffer_size,
        }
    }

    /// Apply worker and buffer sizes from configuration
    ///
    /// The worker count is clamped to `1..=MAX_WORKERS`.
    pub fn with_config(mut self, config: &PipelinedConfig) -> Self {
        self.workers = config.workers.clamp(1, MAX_WORKERS);
        self.buffer_size = config.buffer_size.max(1);
        self
    }

    /// Maximum number of events processed at once
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Create the intake channel, sized by the configured buffer
    pub fn channel(&self) -> (mpsc::Sender<Event>, mpsc::Receiver<Event>) {
        mpsc::channel(self.buffer_size)
    }

    /// Run every pipeline that applies to one event
    ///
    /// Each run is independent: a failing pipeline does not prevent the
    /// others from running.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidResource`] for a malformed event
    /// - [`PipelineError::Pipelines`] with every failed run
    /// - the cancellation error as soon as a run is cancelled
    pub async fn handle_event(&self, ctx: &CancellationToken, event: Event) -> Result<()> {
        event.validate()?;

        let span = crate::event_span!(event);
        let legacy = event.has_legacy_handlers();
        let references = event.pipelines.clone();
        let resource = Resource::Event(event);

        self.dispatch(ctx, &resource, legacy, &references)
            .instrument(span)
            .await
    }

    async fn dispatch(
        &self,
        ctx: &CancellationToken,
        resource: &Resource,
        legacy: bool,
        references: &[ResourceReference],
    ) -> Result<()> {
        if !legacy && references.is_empty() {
            tracing::debug!("event has no pipelines and no handlers, nothing to do");
            return Ok(());
        }

        let mut failures = RunFailures::default();

        if legacy {
            let legacy_adapter = self.adapters.iter().find(|a| a.runs_legacy()).cloned();
            match legacy_adapter {
                Some(adapter) => {
                    tracing::debug!(adapter = adapter.name(), "running legacy pipeline");
                    if let Err(e) = adapter.run(ctx, None, resource).await {
                        if is_cancellation(&e) {
                            return Err(e);
                        }
                        failures.push(LEGACY_PIPELINE_NAME, e);
                    }
                }
                None => failures.push(
                    LEGACY_PIPELINE_NAME,
                    PipelineError::UnsupportedReference {
                        capability: "pipeline",
                        reference: LEGACY_PIPELINE_NAME.to_string(),
                    }
                    .into(),
                ),
            }
        }

        for reference in references {
            let adapter = match self.adapters.dispatch(reference) {
                Ok(adapter) => adapter,
                Err(e) => {
                    failures.push(reference.to_string(), e);
                    continue;
                }
            };
            tracing::debug!(
                adapter = adapter.name(),
                pipeline = %reference.name,
                "running pipeline"
            );
            if let Err(e) = adapter.run(ctx, Some(reference), resource).await {
                if is_cancellation(&e) {
                    return Err(e);
                }
                failures.push(reference.to_string(), e);
            }
        }

        if failures.is_empty() {
            tracing::info!("event processed");
            Ok(())
        } else {
            Err(PipelineError::Pipelines(failures).into())
        }
    }

    /// Consume events until the channel closes or `ctx` is cancelled
    ///
    /// At most [`Pipelined::workers`] events are in flight. Failures are
    /// logged per event; the loop itself only fails if the worker pool does.
    /// Events already being processed are awaited before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker semaphore is closed.
    pub async fn run(
        self: Arc<Self>,
        ctx: CancellationToken,
        mut events: mpsc::Receiver<Event>,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        tracing::info!(
            workers = self.workers,
            buffer_size = self.buffer_size,
            "pipelined started"
        );

        loop {
            let event = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tracing::info!("pipelined cancelled, stopping intake");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        tracing::debug!("event channel closed");
                        break;
                    }
                },
            };

            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                PipelineError::Execution(format!("failed to acquire worker permit: {}", e))
            })?;

            let service = self.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let event_id = event.id;
                if let Err(e) = service.handle_event(&ctx, event).await {
                    tracing::error!(event_id = %event_id, error = %e, "event processing failed");
                }
            });
        }

        // Every permit back means every spawned event finished.
        let permits = u32::try_from(self.workers).map_err(|_| {
            PipelineError::Execution(format!("worker count {} is too large", self.workers))
        })?;
        let _drained = semaphore
            .acquire_many(permits)
            .await
            .map_err(|e| PipelineError::Execution(format!("failed to drain workers: {}", e)))?;
        tracing::info!("pipelined stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::pipeline::mutator::JsonMutator;
    use crate::pipeline::{
        AdapterRegistries, AdapterV1, FilterRegistry, HandlerRegistry, MutatorRegistry,
    };
    use crate::store::StoreGateway;
    use crate::test_utils::{
        assert_error_contains, fixture_event, fixture_handler, fixture_legacy_event,
        fixture_pipeline, RecordingHandler, ScriptedStore,
    };

    fn service(store: ScriptedStore, handler: Arc<RecordingHandler>) -> Pipelined {
        let gateway = StoreGateway::new(Arc::new(store), Duration::from_secs(1));
        let registries = AdapterRegistries {
            filters: FilterRegistry::new("filter"),
            mutators: MutatorRegistry::new("mutator").with(Arc::new(JsonMutator)),
            handlers: HandlerRegistry::new("handler").with(handler),
        };
        let adapters =
            PipelineRegistry::new("pipeline").with(Arc::new(AdapterV1::new(gateway, registries)));
        Pipelined::new(adapters)
    }

    fn store() -> ScriptedStore {
        ScriptedStore::new()
            .with_pipeline(fixture_pipeline("pipeline1", &["handler1"]))
            .with_pipeline(fixture_pipeline("pipeline2", &["handler2"]))
            .with_handler(fixture_handler("slack"))
    }

    #[tokio::test]
    async fn test_event_without_pipelines_is_a_no_op() {
        let handler = RecordingHandler::new();
        let pipelined = service(store(), handler.clone());

        pipelined
            .handle_event(&CancellationToken::new(), fixture_event("entity1", "check1"))
            .await
            .unwrap();
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_every_pipeline_reference_runs() {
        let handler = RecordingHandler::new();
        let pipelined = service(store(), handler.clone());
        let mut event = fixture_legacy_event(2, &["slack"]);
        event.pipelines = vec![
            ResourceReference::pipeline("pipeline1"),
            ResourceReference::pipeline("pipeline2"),
        ];

        pipelined
            .handle_event(&CancellationToken::new(), event)
            .await
            .unwrap();

        let names: Vec<_> = handler.payloads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["slack", "handler1", "handler2"]);
    }

    #[tokio::test]
    async fn test_failed_pipeline_does_not_stop_the_others() {
        let handler = RecordingHandler::new();
        let pipelined = service(store(), handler.clone());
        let mut event = fixture_event("entity1", "check1");
        event.pipelines = vec![
            ResourceReference::pipeline("missing"),
            ResourceReference::pipeline("pipeline1"),
        ];

        let result = pipelined.handle_event(&CancellationToken::new(), event).await;
        assert_eq!(result.unwrap_err().to_string(), "pipeline does not exist");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_reference_with_foreign_api_version() {
        let handler = RecordingHandler::new();
        let pipelined = service(store(), handler);
        let mut event = fixture_event("entity1", "check1");
        event.pipelines = vec![ResourceReference::new("custom/v1", "Pipeline", "p")];

        // AdapterV1 claims every Pipeline type regardless of api version.
        assert_error_contains(
            pipelined.handle_event(&CancellationToken::new(), event).await,
            "pipeline does not exist",
        );
    }

    #[tokio::test]
    async fn test_non_pipeline_reference_does_not_stop_legacy_run() {
        let handler = RecordingHandler::new();
        let pipelined = service(store(), handler.clone());
        let mut event = fixture_legacy_event(2, &["slack"]);
        event.pipelines = vec![
            ResourceReference::handler("notapipeline"),
            ResourceReference::pipeline("pipeline1"),
        ];

        let err = pipelined
            .handle_event(&CancellationToken::new(), event)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported resource reference core/v2.Handler(notapipeline): no pipeline adapter can handle it"
        );

        let names: Vec<_> = handler.payloads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["slack", "handler1"]);
    }

    #[tokio::test]
    async fn test_legacy_event_without_legacy_adapter() {
        let pipelined = Pipelined::new(PipelineRegistry::new("pipeline"));
        let result = pipelined
            .handle_event(&CancellationToken::new(), fixture_legacy_event(2, &["slack"]))
            .await;
        assert_error_contains(result, "unsupported resource reference legacy-pipeline");
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected() {
        let pipelined = service(store(), RecordingHandler::new());
        let result = pipelined
            .handle_event(&CancellationToken::new(), fixture_event("bad name!", "check1"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let handler = RecordingHandler::new();
        let pipelined = Arc::new(
            service(store(), handler.clone()).with_config(&PipelinedConfig {
                workers: 2,
                buffer_size: 4,
            }),
        );
        let (tx, rx) = pipelined.channel();

        let worker = tokio::spawn(pipelined.clone().run(CancellationToken::new(), rx));
        for _ in 0..5 {
            tx.send(fixture_legacy_event(2, &["slack"])).await.unwrap();
        }
        drop(tx);

        worker.await.unwrap().unwrap();
        assert_eq!(handler.calls(), 5);
    }

    #[test]
    fn test_worker_count_is_clamped() {
        let pipelined = Pipelined::new(PipelineRegistry::new("pipeline")).with_config(
            &PipelinedConfig {
                workers: usize::MAX,
                buffer_size: 4,
            },
        );
        assert_eq!(pipelined.workers(), MAX_WORKERS);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let pipelined = Arc::new(service(store(), RecordingHandler::new()));
        let (_tx, rx) = pipelined.channel();
        let ctx = CancellationToken::new();

        let worker = tokio::spawn(pipelined.clone().run(ctx.clone(), rx));
        ctx.cancel();

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
