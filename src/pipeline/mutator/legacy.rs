//! Store-backed mutator adapter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::BUILTIN_MUTATORS;
use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionRequest, Executor};
use crate::pipeline::{Adapter, MutatorAdapter};
use crate::resources::{kind, Event, MutatorType, ResourceReference, CORE_API_VERSION};
use crate::store::StoreGateway;

/// Serves every `core/v2` mutator that is not a built-in
///
/// Pipe mutators run their command with the event JSON on stdin; the
/// command's output becomes the payload.
pub struct LegacyMutatorAdapter {
    gateway: StoreGateway,
    executor: Arc<dyn Executor>,
    default_timeout: Duration,
}

impl LegacyMutatorAdapter {
    /// Create an adapter; mutators without a timeout get `default_timeout`
    pub fn new(gateway: StoreGateway, executor: Arc<dyn Executor>, default_timeout: Duration) -> Self {
        Self {
            gateway,
            executor,
            default_timeout,
        }
    }
}

impl Adapter for LegacyMutatorAdapter {
    fn name(&self) -> &str {
        "LegacyMutatorAdapter"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.api_version == CORE_API_VERSION
            && reference.is_type(kind::MUTATOR)
            && !BUILTIN_MUTATORS.contains(&reference.name.as_str())
    }
}

#[async_trait]
impl MutatorAdapter for LegacyMutatorAdapter {
    async fn mutate(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
    ) -> Result<Vec<u8>> {
        let mutator = self
            .gateway
            .fetch_mutator(ctx, &reference.name)
            .await
            .map_err(PipelineError::MutatorFetch)?;

        let command = match (mutator.mutator_type, mutator.command.as_deref()) {
            (MutatorType::Pipe, Some(command)) if !command.is_empty() => command.to_string(),
            (MutatorType::Pipe, _) => {
                return Err(PipelineError::Execution(format!(
                    "pipe mutator {} has no command",
                    mutator.name()
                ))
                .into())
            }
            (MutatorType::Javascript, _) => {
                return Err(PipelineError::Execution(format!(
                    "javascript mutator {} is not supported",
                    mutator.name()
                ))
                .into())
            }
        };

        let timeout = match mutator.timeout {
            0 => self.default_timeout,
            secs => Duration::from_secs(secs),
        };
        let input = serde_json::to_vec(event)?;
        let request = ExecutionRequest::new(mutator.name(), command, input)
            .with_env(mutator.env_vars.clone())
            .with_timeout(timeout);

        let response = self.executor.execute(ctx, request).await?;
        if response.status != 0 {
            tracing::error!(
                mutator = %mutator.name(),
                status = response.status,
                output = %response.output,
                "mutator execution failed"
            );
            return Err(PipelineError::Execution(format!(
                "mutator {} exited with status {}",
                mutator.name(),
                response.status
            ))
            .into());
        }

        tracing::debug!(
            mutator = %mutator.name(),
            bytes = response.output.len(),
            "event mutated"
        );
        Ok(response.output.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Mutator;
    use crate::test_utils::{assert_error_contains, fixture_event, RecordingExecutor, ScriptedStore};

    fn adapter(store: ScriptedStore, executor: Arc<RecordingExecutor>) -> LegacyMutatorAdapter {
        let gateway = StoreGateway::new(Arc::new(store), Duration::from_secs(1));
        LegacyMutatorAdapter::new(gateway, executor, Duration::from_secs(60))
    }

    async fn mutate(adapter: &LegacyMutatorAdapter, name: &str) -> Result<Vec<u8>> {
        adapter
            .mutate(
                &CancellationToken::new(),
                &ResourceReference::mutator(name),
                &fixture_event("entity1", "check1"),
            )
            .await
    }

    #[tokio::test]
    async fn test_pipe_mutator_output_is_payload() {
        let executor = Arc::new(RecordingExecutor::new(0, "mutated"));
        let mut jq = Mutator::pipe("jq", "jq .check");
        jq.timeout = 5;
        jq.env_vars = vec!["MODE=compact".to_string()];
        let adapter = adapter(ScriptedStore::new().with_mutator(jq), executor.clone());

        let payload = mutate(&adapter, "jq").await.unwrap();
        assert_eq!(payload, b"mutated");

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "jq .check");
        assert_eq!(requests[0].timeout, Duration::from_secs(5));
        assert_eq!(requests[0].env, vec!["MODE=compact"]);
        let input: Event = serde_json::from_slice(&requests[0].input).unwrap();
        assert_eq!(input.entity.metadata.name, "entity1");
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let executor = Arc::new(RecordingExecutor::new(0, ""));
        let adapter = adapter(
            ScriptedStore::new().with_mutator(Mutator::pipe("jq", "jq .")),
            executor.clone(),
        );

        mutate(&adapter, "jq").await.unwrap();
        assert_eq!(executor.requests()[0].timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let executor = Arc::new(RecordingExecutor::new(1, "parse error"));
        let adapter = adapter(
            ScriptedStore::new().with_mutator(Mutator::pipe("jq", "jq .")),
            executor,
        );

        assert_error_contains(mutate(&adapter, "jq").await, "mutator jq exited with status 1");
    }

    #[tokio::test]
    async fn test_javascript_mutator_unsupported() {
        let mut js = Mutator::pipe("js", "");
        js.mutator_type = MutatorType::Javascript;
        js.eval = Some("data".to_string());
        let executor = Arc::new(RecordingExecutor::new(0, ""));
        let adapter = adapter(ScriptedStore::new().with_mutator(js), executor.clone());

        assert_error_contains(mutate(&adapter, "js").await, "is not supported");
        assert!(executor.requests().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure() {
        let executor = Arc::new(RecordingExecutor::new(0, ""));
        let adapter = adapter(ScriptedStore::new().failing_with("etcd timeout"), executor);

        assert_error_contains(
            mutate(&adapter, "jq").await,
            "failed to fetch mutator from store: internal error: etcd timeout",
        );
    }

    #[test]
    fn test_can_handle_skips_builtins() {
        let adapter = adapter(ScriptedStore::new(), Arc::new(RecordingExecutor::new(0, "")));
        assert!(adapter.can_handle(&ResourceReference::mutator("jq")));
        assert!(!adapter.can_handle(&ResourceReference::mutator("json")));
        assert!(!adapter.can_handle(&ResourceReference::mutator("only_check_output")));
    }
}
