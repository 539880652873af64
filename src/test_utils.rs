//! Test utilities for eventpipe
//!
//! Deterministic fakes for the store, executor and adapter boundaries, plus
//! resource fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::executor::{ExecutionRequest, ExecutionResponse, Executor};
use crate::pipeline::{Adapter, FilterAdapter, HandlerAdapter};
use crate::resources::{
    kind, Check, Entity, Event, EventFilter, Handler, Mutator, Pipeline, PipelineWorkflow,
    ResourceReference,
};
use crate::store::{Store, StoreResult};

/// A store answering from fixed maps, optionally failing or slow
#[derive(Default)]
pub struct ScriptedStore {
    pipelines: HashMap<String, Pipeline>,
    handlers: HashMap<String, Handler>,
    mutators: HashMap<String, Mutator>,
    filters: HashMap<String, EventFilter>,
    failure: Option<String>,
    handler_failure: Option<String>,
    delay: Option<Duration>,
    handler_lookups: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.insert(pipeline.metadata.name.clone(), pipeline);
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.insert(handler.metadata.name.clone(), handler);
        self
    }

    pub fn with_mutator(mut self, mutator: Mutator) -> Self {
        self.mutators.insert(mutator.metadata.name.clone(), mutator);
        self
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filters.insert(filter.metadata.name.clone(), filter);
        self
    }

    /// Every lookup fails with `internal error: <message>`
    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Handler lookups fail with `internal error: <message>`, other
    /// lookups answer normally
    pub fn failing_handlers_with(mut self, message: &str) -> Self {
        self.handler_failure = Some(message.to_string());
        self
    }

    /// Every lookup sleeps before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of handler lookups served so far
    pub fn handler_lookups(&self) -> usize {
        self.handler_lookups.load(Ordering::SeqCst)
    }

    async fn answer<T: Clone>(&self, map: &HashMap<String, T>, name: &str) -> StoreResult<T> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(StoreError::internal(message.clone()));
        }
        Ok(map.get(name).cloned())
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn get_pipeline_by_name(&self, name: &str) -> StoreResult<Pipeline> {
        self.answer(&self.pipelines, name).await
    }

    async fn get_handler_by_name(&self, name: &str) -> StoreResult<Handler> {
        self.handler_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.handler_failure {
            return Err(StoreError::internal(message.clone()));
        }
        self.answer(&self.handlers, name).await
    }

    async fn get_mutator_by_name(&self, name: &str) -> StoreResult<Mutator> {
        self.answer(&self.mutators, name).await
    }

    async fn get_event_filter_by_name(&self, name: &str) -> StoreResult<EventFilter> {
        self.answer(&self.filters, name).await
    }
}

/// Check event for an entity, status OK, no handlers
pub fn fixture_event(entity: &str, check: &str) -> Event {
    Event::with_check(Entity::new(entity), Check::new(check, 0))
}

/// Check event whose check names the given legacy handlers
pub fn fixture_legacy_event(status: u32, handlers: &[&str]) -> Event {
    let mut check = Check::new("check1", status);
    check.handlers = handlers.iter().map(|h| h.to_string()).collect();
    Event::with_check(Entity::new("entity1"), check)
}

pub fn fixture_pipeline_reference(name: &str) -> ResourceReference {
    ResourceReference::pipeline(name)
}

/// Pipe handler running `command`
pub fn fixture_handler(name: &str) -> Handler {
    Handler::pipe(name, "command")
}

/// Pipeline with one workflow per handler name, no filters and no mutator
pub fn fixture_pipeline(name: &str, handlers: &[&str]) -> Pipeline {
    let mut pipeline = Pipeline::new(name, "default");
    for handler in handlers {
        pipeline.workflows.push(PipelineWorkflow::new(
            format!("send to {}", handler),
            ResourceReference::handler(*handler),
        ));
    }
    pipeline
}

/// Executor answering every request with a fixed response
pub struct RecordingExecutor {
    status: i32,
    output: String,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl RecordingExecutor {
    pub fn new(status: i32, output: &str) -> Self {
        Self {
            status,
            output: output.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(
        &self,
        _ctx: &CancellationToken,
        request: ExecutionRequest,
    ) -> Result<ExecutionResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(ExecutionResponse {
            status: self.status,
            output: self.output.clone(),
            duration: Duration::from_millis(1),
        })
    }
}

/// Handler adapter for every core/v2 Handler reference, recording payloads
#[derive(Default)]
pub struct RecordingHandler {
    calls: AtomicUsize,
    payloads: Mutex<Vec<(String, Vec<u8>)>>,
    failure: Option<String>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A recording handler whose every call fails with `message`
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(message.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Handler names and payloads, in call order
    pub fn payloads(&self) -> Vec<(String, Vec<u8>)> {
        self.payloads.lock().unwrap().clone()
    }
}

impl Adapter for RecordingHandler {
    fn name(&self) -> &str {
        "RecordingHandler"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.is_type(kind::HANDLER)
    }
}

#[async_trait]
impl HandlerAdapter for RecordingHandler {
    async fn handle(
        &self,
        _ctx: &CancellationToken,
        reference: &ResourceReference,
        _event: &Event,
        payload: &[u8],
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .push((reference.name.clone(), payload.to_vec()));
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}

/// Filter adapter claiming one event filter name with a fixed verdict
pub struct StaticFilter {
    filter_name: String,
    deny: bool,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StaticFilter {
    pub fn allowing(name: &str) -> Arc<Self> {
        Self::build(name, false)
    }

    pub fn denying(name: &str) -> Arc<Self> {
        Self::build(name, true)
    }

    /// A filter whose every evaluation fails with `message`
    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            filter_name: name.to_string(),
            deny: false,
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn build(name: &str, deny: bool) -> Arc<Self> {
        Arc::new(Self {
            filter_name: name.to_string(),
            deny,
            failure: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Adapter for StaticFilter {
    fn name(&self) -> &str {
        &self.filter_name
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.is_type(kind::EVENT_FILTER) && reference.name == self.filter_name
    }
}

#[async_trait]
impl FilterAdapter for StaticFilter {
    async fn filter(
        &self,
        _ctx: &CancellationToken,
        _reference: &ResourceReference,
        _event: &Event,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(self.deny),
        }
    }
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected
/// message
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!(
            "Expected error containing '{}', but got Ok({:?})",
            expected, value
        ),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Expected error to contain '{}', but got: {}",
                expected,
                error_msg
            );
        }
    }
}
