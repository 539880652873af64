//! Store-backed handler adapter
//!
//! Fetches the referenced handler and delivers the payload according to
//! its type:
//!
//! - `pipe`: runs the command with the payload on stdin
//! - `tcp`: connects and writes the payload
//! - `udp`: sends the payload as one datagram
//!
//! `set` handlers are expanded before a workflow ever points at them, and
//! `grpc` handlers need an extension runtime, so both are refused here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionRequest, Executor};
use crate::pipeline::{Adapter, HandlerAdapter};
use crate::resources::{kind, Event, Handler, HandlerType, ResourceReference, CORE_API_VERSION};
use crate::store::StoreGateway;

/// Default socket handler deadline
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs stored `core/v2` handlers
pub struct LegacyHandlerAdapter {
    gateway: StoreGateway,
    executor: Arc<dyn Executor>,
    default_timeout: Duration,
    socket_timeout: Duration,
}

impl LegacyHandlerAdapter {
    /// Create an adapter; pipe handlers without a timeout get
    /// `default_timeout`
    pub fn new(gateway: StoreGateway, executor: Arc<dyn Executor>, default_timeout: Duration) -> Self {
        Self {
            gateway,
            executor,
            default_timeout,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }

    /// Set the deadline for tcp and udp delivery
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    async fn run_pipe(
        &self,
        ctx: &CancellationToken,
        handler: &Handler,
        payload: &[u8],
    ) -> Result<()> {
        let command = handler
            .command
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                PipelineError::Execution(format!("pipe handler {} has no command", handler.name()))
            })?;
        let timeout = match handler.timeout {
            0 => self.default_timeout,
            secs => Duration::from_secs(secs),
        };

        let request = ExecutionRequest::new(handler.name(), command, payload.to_vec())
            .with_env(handler.env_vars.clone())
            .with_timeout(timeout);
        let response = self.executor.execute(ctx, request).await?;

        // The handler ran; its own exit status is reported, not returned.
        if response.status != 0 {
            tracing::warn!(
                handler = %handler.name(),
                status = response.status,
                output = %response.output,
                "handler exited with non-zero status"
            );
        } else {
            tracing::info!(
                handler = %handler.name(),
                duration_ms = response.duration.as_millis() as u64,
                output = %response.output,
                "event pipe handler executed"
            );
        }
        Ok(())
    }

    async fn run_socket(
        &self,
        ctx: &CancellationToken,
        handler: &Handler,
        payload: &[u8],
    ) -> Result<()> {
        let socket = handler.socket.as_ref().ok_or_else(|| {
            PipelineError::Socket(format!(
                "{} handler {} has no socket",
                handler.handler_type,
                handler.name()
            ))
        })?;
        let address = format!("{}:{}", socket.host, socket.port);

        let delivery = async {
            match handler.handler_type {
                HandlerType::Udp => {
                    let conn = UdpSocket::bind("0.0.0.0:0").await?;
                    conn.send_to(payload, &address).await?;
                }
                _ => {
                    let mut conn = TcpStream::connect(&address).await?;
                    conn.write_all(payload).await?;
                    conn.shutdown().await?;
                }
            }
            Ok::<(), std::io::Error>(())
        };

        let delivered = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                tracing::debug!(handler = %handler.name(), "socket delivery cancelled");
                return Err(PipelineError::Cancelled.into());
            }
            delivered = tokio::time::timeout(self.socket_timeout, delivery) => delivered,
        };

        match delivered {
            Ok(Ok(())) => {
                tracing::info!(
                    handler = %handler.name(),
                    address = %address,
                    bytes = payload.len(),
                    "event socket handler executed"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(PipelineError::Socket(format!(
                "{} handler {} failed to deliver to {}: {}",
                handler.handler_type,
                handler.name(),
                address,
                e
            ))
            .into()),
            Err(_) => Err(PipelineError::Socket(format!(
                "{} handler {} timed out after {:?} delivering to {}",
                handler.handler_type,
                handler.name(),
                self.socket_timeout,
                address
            ))
            .into()),
        }
    }
}

impl Adapter for LegacyHandlerAdapter {
    fn name(&self) -> &str {
        "LegacyHandlerAdapter"
    }

    fn can_handle(&self, reference: &ResourceReference) -> bool {
        reference.api_version == CORE_API_VERSION && reference.is_type(kind::HANDLER)
    }
}

#[async_trait]
impl HandlerAdapter for LegacyHandlerAdapter {
    async fn handle(
        &self,
        ctx: &CancellationToken,
        reference: &ResourceReference,
        event: &Event,
        payload: &[u8],
    ) -> Result<()> {
        let handler = self
            .gateway
            .fetch_handler(ctx, &reference.name)
            .await
            .map_err(PipelineError::HandlerFetch)?;

        tracing::debug!(
            handler = %handler.name(),
            handler_type = %handler.handler_type,
            event_id = %event.id,
            "running handler"
        );

        match handler.handler_type {
            HandlerType::Pipe => self.run_pipe(ctx, &handler, payload).await,
            HandlerType::Tcp | HandlerType::Udp => self.run_socket(ctx, &handler, payload).await,
            HandlerType::Set => Err(PipelineError::Execution(format!(
                "handler set {} cannot be run directly",
                handler.name()
            ))
            .into()),
            HandlerType::Grpc => Err(PipelineError::Execution(format!(
                "grpc handler {} is not supported",
                handler.name()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::executor::ProcessExecutor;
    use crate::test_utils::{
        assert_error_contains, fixture_event, fixture_handler, RecordingExecutor, ScriptedStore,
    };

    fn adapter(store: ScriptedStore, executor: Arc<RecordingExecutor>) -> LegacyHandlerAdapter {
        let gateway = StoreGateway::new(Arc::new(store), Duration::from_secs(1));
        LegacyHandlerAdapter::new(gateway, executor, Duration::from_secs(60))
    }

    async fn handle(adapter: &LegacyHandlerAdapter, name: &str, payload: &[u8]) -> Result<()> {
        adapter
            .handle(
                &CancellationToken::new(),
                &ResourceReference::handler(name),
                &fixture_event("entity1", "check1"),
                payload,
            )
            .await
    }

    #[test]
    fn test_can_handle() {
        let adapter = adapter(ScriptedStore::new(), Arc::new(RecordingExecutor::new(0, "")));
        assert!(adapter.can_handle(&ResourceReference::handler("slack")));
        assert!(!adapter.can_handle(&ResourceReference::mutator("slack")));
        assert!(!adapter.can_handle(&ResourceReference::new("core/v3", "Handler", "slack")));
    }

    #[tokio::test]
    async fn test_pipe_handler_receives_payload() {
        let executor = Arc::new(RecordingExecutor::new(0, "foo"));
        let adapter = adapter(
            ScriptedStore::new().with_handler(fixture_handler("handler1")),
            executor.clone(),
        );

        handle(&adapter, "handler1", b"{\"id\":1}").await.unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "handler1");
        assert_eq!(requests[0].command, "command");
        assert_eq!(requests[0].input, b"{\"id\":1}");
        assert_eq!(requests[0].timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_pipe_handler_non_zero_exit_is_not_an_error() {
        let executor = Arc::new(RecordingExecutor::new(2, "slack unreachable"));
        let adapter = adapter(
            ScriptedStore::new().with_handler(fixture_handler("slack")),
            executor,
        );

        assert!(handle(&adapter, "slack", b"{}").await.is_ok());
    }

    #[tokio::test]
    async fn test_handler_fetch_failure() {
        let adapter = adapter(
            ScriptedStore::new().failing_with("etcd timeout"),
            Arc::new(RecordingExecutor::new(0, "foo")),
        );

        let err = handle(&adapter, "handler1", b"{}").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to fetch handler from store: internal error: etcd timeout"
        );
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let adapter = adapter(ScriptedStore::new(), Arc::new(RecordingExecutor::new(0, "")));
        assert_error_contains(
            handle(&adapter, "ghost", b"{}").await,
            "failed to fetch handler from store: handler does not exist",
        );
    }

    #[tokio::test]
    async fn test_tcp_handler_writes_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).await.unwrap();
            received
        });

        let graphite = Handler::socket("graphite", HandlerType::Tcp, "127.0.0.1", port);
        let adapter = adapter(
            ScriptedStore::new().with_handler(graphite),
            Arc::new(RecordingExecutor::new(0, "")),
        );

        handle(&adapter, "graphite", b"metric 1 1700000000\n")
            .await
            .unwrap();
        assert_eq!(server.await.unwrap(), b"metric 1 1700000000\n");
    }

    #[tokio::test]
    async fn test_udp_handler_sends_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let statsd = Handler::socket("statsd", HandlerType::Udp, "127.0.0.1", port);
        let adapter = adapter(
            ScriptedStore::new().with_handler(statsd),
            Arc::new(RecordingExecutor::new(0, "")),
        );

        handle(&adapter, "statsd", b"checks:1|c").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"checks:1|c");
    }

    #[tokio::test]
    async fn test_tcp_handler_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let dead = Handler::socket("dead", HandlerType::Tcp, "127.0.0.1", port);
        let adapter = adapter(
            ScriptedStore::new().with_handler(dead),
            Arc::new(RecordingExecutor::new(0, "")),
        )
        .with_socket_timeout(Duration::from_secs(2));

        assert_error_contains(handle(&adapter, "dead", b"x").await, "failed to deliver");
    }

    #[tokio::test]
    async fn test_cancel_stops_running_pipe_handler() {
        let gateway = StoreGateway::new(
            Arc::new(ScriptedStore::new().with_handler(Handler::pipe("slow", "sleep 5"))),
            Duration::from_secs(1),
        );
        let adapter = LegacyHandlerAdapter::new(
            gateway,
            Arc::new(ProcessExecutor::new()),
            Duration::from_secs(60),
        );
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = adapter
            .handle(
                &ctx,
                &ResourceReference::handler("slow"),
                &fixture_event("entity1", "check1"),
                b"{}",
            )
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.to_string(), "pipeline run cancelled");
    }

    #[tokio::test]
    async fn test_grpc_and_set_handlers_are_refused() {
        let mut grpc = fixture_handler("extension");
        grpc.handler_type = HandlerType::Grpc;
        let adapter = adapter(
            ScriptedStore::new()
                .with_handler(grpc)
                .with_handler(Handler::set("ops", &["slack"])),
            Arc::new(RecordingExecutor::new(0, "")),
        );

        assert_error_contains(handle(&adapter, "extension", b"{}").await, "not supported");
        assert_error_contains(handle(&adapter, "ops", b"{}").await, "cannot be run directly");
    }
}
