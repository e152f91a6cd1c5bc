//! TCP RPC server for the inventory service.
//!
//! Listens on a local address, accepts client connections, and dispatches
//! JSON-RPC method calls (`service.method`) to the registered services.
//! Streaming calls push notification frames before the final response.
//!
//! # Thread Safety
//!
//! The server runs on the tokio runtime. Each connection is handled in its
//! own spawned task. Services are shared via `Arc` and synchronize
//! internally.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use surveyor_core::config::RpcConfig;
use surveyor_core::error::{Result, SurveyorError};
use surveyor_core::progress::Progress;
use surveyor_core::protocol::{read_frame, write_frame, RpcErrorObject, RpcRequest, RpcResponse};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

/// Outcome of a dispatched call: a plain value, or a progress stream whose
/// terminal event becomes the call's response.
pub enum Dispatch {
    Value(serde_json::Value),
    Stream(UnboundedReceiver<Progress>),
}

/// A named RPC service. Implementations translate wire params into
/// manager calls and back; they own no index state of their own.
#[async_trait::async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Dispatch a method (the part after `service.`) with its params.
    async fn dispatch(&self, method: &str, params: serde_json::Value) -> Result<Dispatch>;
}

/// Routes `service.method` names to registered services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn RpcService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, service: Arc<dyn RpcService>) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    async fn dispatch(&self, method: &str, params: serde_json::Value) -> Result<Dispatch> {
        let (service_name, method_name) =
            method
                .split_once('.')
                .ok_or_else(|| SurveyorError::InvalidParams {
                    message: format!("malformed method name: {}", method),
                })?;
        let service =
            self.services
                .get(service_name)
                .ok_or_else(|| SurveyorError::InvalidParams {
                    message: format!("unknown service: {}", service_name),
                })?;
        service.dispatch(method_name, params).await
    }
}

/// Handle to a running RPC server. Dropping shuts down the server.
pub struct RpcServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut down the server gracefully.
    ///
    /// Stops accepting new connections and signals all active connection
    /// handlers to close. Crawls already running on the executor are not
    /// interrupted.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// RPC server that listens for client connections.
pub struct RpcServer;

impl RpcServer {
    /// Start the server on the given address (port 0 picks a free port).
    ///
    /// Returns a handle that can be used to get the port and shut down the
    /// server. The server runs in background tokio tasks.
    pub async fn start(addr: SocketAddr, registry: Arc<ServiceRegistry>) -> Result<RpcServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let port = addr.port();

        info!("RPC server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            registry,
            shutdown_rx,
            conn_shutdown_rx,
        ));

        Ok(RpcServerHandle {
            addr,
            port,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        registry: Arc<ServiceRegistry>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("RPC server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let registry = registry.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("RPC connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(stream, &registry, &mut conn_shutdown).await {
                                    debug!("RPC connection {} ended: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("RPC accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        registry: &ServiceRegistry,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            // Wait for either a frame or a shutdown signal
            let frame = tokio::select! {
                result = read_frame(&mut stream) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()), // Clean disconnect
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(()); // Server shutting down
                }
            };

            let request: RpcRequest = match serde_json::from_slice(&frame) {
                Ok(req) => req,
                Err(e) => {
                    let response = RpcResponse::error(None, -32700, format!("Parse error: {}", e));
                    write_frame(&mut stream, &serde_json::to_vec(&response)?).await?;
                    continue;
                }
            };

            if request.jsonrpc != "2.0" {
                let response = RpcResponse::error(
                    request.id,
                    -32600,
                    "Invalid Request: expected jsonrpc 2.0".to_string(),
                );
                write_frame(&mut stream, &serde_json::to_vec(&response)?).await?;
                continue;
            }

            let params = request
                .params
                .unwrap_or(serde_json::Value::Object(Default::default()));

            match registry.dispatch(&request.method, params).await {
                Ok(Dispatch::Value(result)) => {
                    let response = RpcResponse::success(request.id, result);
                    write_frame(&mut stream, &serde_json::to_vec(&response)?).await?;
                }
                Ok(Dispatch::Stream(events)) => {
                    Self::stream_progress(&mut stream, request.id, events).await?;
                }
                Err(e) => {
                    let response = error_response(request.id, &e);
                    write_frame(&mut stream, &serde_json::to_vec(&response)?).await?;
                }
            }
        }
    }

    /// Relay a progress stream: running events as notification frames, the
    /// terminal event as the final response. A stream that closes without a
    /// terminal event means the terminal commit never happened; the call
    /// fails rather than claiming an outcome.
    async fn stream_progress(
        stream: &mut TcpStream,
        id: Option<serde_json::Value>,
        mut events: UnboundedReceiver<Progress>,
    ) -> Result<()> {
        let mut terminal = None;
        while let Some(event) = events.recv().await {
            if event.is_final {
                terminal = Some(event);
            } else {
                let note =
                    RpcRequest::notification(RpcConfig::PROGRESS_METHOD, serde_json::to_value(&event)?);
                write_frame(stream, &serde_json::to_vec(&note)?).await?;
            }
        }

        let response = match terminal {
            Some(event) => RpcResponse::success(id, serde_json::to_value(&event)?),
            None => RpcResponse::error(
                id,
                -32603,
                "progress stream ended without a terminal event".to_string(),
            ),
        };
        write_frame(stream, &serde_json::to_vec(&response)?).await
    }
}

/// Build the error response for a failed dispatch, attaching the index id
/// as structured data where the error carries one.
fn error_response(id: Option<serde_json::Value>, err: &SurveyorError) -> RpcResponse {
    let data = match err {
        SurveyorError::NotFound { id }
        | SurveyorError::Conflict { id }
        | SurveyorError::DuplicateId { id } => Some(serde_json::json!({"id": id})),
        _ => None,
    };
    RpcResponse {
        jsonrpc: "2.0".to_string(),
        result: None,
        error: Some(RpcErrorObject {
            code: err.to_rpc_error_code(),
            message: err.to_string(),
            data,
        }),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surveyor_core::protocol::decode_frame;
    use surveyor_core::protocol::RpcFrame;

    struct EchoService;

    #[async_trait::async_trait]
    impl RpcService for EchoService {
        async fn dispatch(&self, method: &str, params: serde_json::Value) -> Result<Dispatch> {
            match method {
                "echo" => Ok(Dispatch::Value(params)),
                "fail" => Err(SurveyorError::Other("test failure".to_string())),
                "missing" => Err(SurveyorError::NotFound { id: 42 }),
                "stream" => {
                    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                    tx.send(Progress::running(
                        1,
                        surveyor_core::crawler::CrawlUpdate {
                            phase: "crawling".to_string(),
                            counts: Default::default(),
                        },
                    ))
                    .unwrap();
                    tx.send(Progress::terminal(
                        1,
                        Default::default(),
                        surveyor_core::store::IndexStatus::Success,
                        "done".to_string(),
                    ))
                    .unwrap();
                    Ok(Dispatch::Stream(rx))
                }
                "stream_empty" => {
                    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Progress>();
                    drop(tx);
                    Ok(Dispatch::Stream(rx))
                }
                _ => Err(SurveyorError::InvalidParams {
                    message: format!("unknown method: {}", method),
                }),
            }
        }
    }

    async fn start_echo_server() -> RpcServerHandle {
        let registry =
            Arc::new(ServiceRegistry::new().register("test", Arc::new(EchoService) as Arc<dyn RpcService>));
        RpcServer::start("127.0.0.1:0".parse().unwrap(), registry)
            .await
            .unwrap()
    }

    async fn roundtrip(stream: &mut TcpStream, request: &RpcRequest) -> RpcResponse {
        write_frame(stream, &serde_json::to_vec(request).unwrap())
            .await
            .unwrap();
        let bytes = read_frame(stream).await.unwrap().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_server_echo_roundtrip() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        let request = RpcRequest::new("test.echo", serde_json::json!({"hello": "world"}), 1);
        let response = roundtrip(&mut stream, &request).await;

        assert!(response.error.is_none());
        assert_eq!(response.result, Some(serde_json::json!({"hello": "world"})));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_error_carries_code_and_data() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        let response = roundtrip(
            &mut stream,
            &RpcRequest::new("test.missing", serde_json::json!({}), 2),
        )
        .await;

        let err = response.error.unwrap();
        assert_eq!(err.code, -32001);
        assert_eq!(err.data, Some(serde_json::json!({"id": 42})));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_service_is_invalid_params() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        let response = roundtrip(
            &mut stream,
            &RpcRequest::new("nosuch.echo", serde_json::json!({}), 3),
        )
        .await;
        assert_eq!(response.error.unwrap().code, -32602);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_invalid_json_returns_parse_error() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        write_frame(&mut stream, b"not valid json").await.unwrap();

        let bytes = read_frame(&mut stream).await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_stream_notifications_then_final_response() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        let request = RpcRequest::new("test.stream", serde_json::json!({}), 4);
        write_frame(&mut stream, &serde_json::to_vec(&request).unwrap())
            .await
            .unwrap();

        // First frame: a notification with no id
        let bytes = read_frame(&mut stream).await.unwrap().unwrap();
        match decode_frame(&bytes).unwrap() {
            RpcFrame::Notification(note) => {
                assert_eq!(note.method, RpcConfig::PROGRESS_METHOD);
                assert!(note.id.is_none());
            }
            other => panic!("expected notification, got {:?}", other),
        }

        // Second frame: the final response with the terminal event
        let bytes = read_frame(&mut stream).await.unwrap().unwrap();
        match decode_frame(&bytes).unwrap() {
            RpcFrame::Response(response) => {
                let result = response.result.unwrap();
                assert_eq!(result["is_final"], serde_json::json!(true));
                assert_eq!(result["status"], serde_json::json!("SUCCESS"));
            }
            other => panic!("expected response, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_stream_without_terminal_event_fails() {
        let mut handle = start_echo_server().await;
        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();

        let response = roundtrip(
            &mut stream,
            &RpcRequest::new("test.stream_empty", serde_json::json!({}), 5),
        )
        .await;
        let err = response.error.unwrap();
        assert_eq!(err.code, -32603);
        assert!(err.message.contains("terminal"));

        handle.shutdown();
    }
}
