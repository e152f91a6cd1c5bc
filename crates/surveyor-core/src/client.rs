//! TCP RPC client for the inventory service.
//!
//! Establishes a TCP connection to the server and provides typed wrappers
//! over JSON-RPC method invocation. Unary calls share one connection; a
//! streaming `create` opens its own connection so that dropping the stream
//! mid-crawl cannot desynchronize unrelated calls.
//!
//! # Thread Safety
//!
//! The shared channel uses a tokio `Mutex` to serialize access to the TCP
//! stream, allowing safe concurrent use from multiple async tasks.

use crate::config::RpcConfig;
use crate::error::{Result, SurveyorError};
use crate::progress::Progress;
use crate::protocol::{decode_frame, read_frame, write_frame, RpcFrame, RpcRequest, RpcResponse};
use crate::store::InventoryIndex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared connection for unary JSON-RPC calls.
#[derive(Debug)]
pub struct RpcChannel {
    stream: Mutex<TcpStream>,
    addr: SocketAddr,
    next_id: AtomicU64,
}

impl RpcChannel {
    /// Connect to the server, bounded by the configured connect timeout.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| SurveyorError::Connectivity {
                message: format!("connect to {} timed out", addr),
            })?
            .map_err(|e| SurveyorError::Connectivity {
                message: format!("connect to {} failed: {}", addr, e),
            })?;

        debug!("RPC client connected to {}", addr);

        Ok(Self {
            stream: Mutex::new(stream),
            addr,
            next_id: AtomicU64::new(1),
        })
    }

    /// Call a JSON-RPC method and wait for its response.
    ///
    /// Server-side errors come back as typed [`SurveyorError`] values,
    /// rebuilt from the wire code; transport failures map to
    /// `Connectivity`.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let request_bytes = serde_json::to_vec(&request)?;

        let mut stream = self.stream.lock().await;
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, &request_bytes)
            .await
            .map_err(|_| SurveyorError::Connectivity {
                message: format!("connection to {} lost while sending", self.addr),
            })?;

        let response_bytes = read_frame(&mut reader)
            .await
            .map_err(|_| SurveyorError::Connectivity {
                message: format!("connection to {} lost while receiving", self.addr),
            })?
            .ok_or_else(|| SurveyorError::Connectivity {
                message: format!("connection to {} closed by server", self.addr),
            })?;

        let response: RpcResponse =
            serde_json::from_slice(&response_bytes).map_err(|e| SurveyorError::Json {
                message: format!("failed to parse RPC response: {}", e),
                source: Some(e),
            })?;

        unpack_response(response)
    }

    /// Get the address of the connected server.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Turn a response into its result value or the typed error it carries.
fn unpack_response(response: RpcResponse) -> Result<serde_json::Value> {
    if let Some(err) = response.error {
        let index_id = err
            .data
            .as_ref()
            .and_then(|d| d.get("id"))
            .and_then(|v| v.as_i64());
        return Err(SurveyorError::from_rpc(err.code, err.message, index_id));
    }
    response
        .result
        .ok_or_else(|| SurveyorError::Other("RPC response missing result".to_string()))
}

/// A live progress stream for one `inventory.create` call.
///
/// Yields running events as the server pushes them, then the terminal
/// event carried by the final response frame, then `None`. Dropping the
/// stream early abandons only this connection; the server-side crawl runs
/// to completion regardless.
pub struct ProgressStream {
    stream: TcpStream,
    index_id: Option<i64>,
    done: bool,
}

impl ProgressStream {
    /// The index id, once the first event has been seen.
    pub fn index_id(&self) -> Option<i64> {
        self.index_id
    }

    /// Wait for the next progress event.
    ///
    /// Returns `Ok(None)` once the stream is complete. A clean close
    /// without a terminal event also yields `None`: the server lost its
    /// storage connection after the crawl started, and the index's fate is
    /// whatever `get` reports.
    pub async fn next(&mut self) -> Result<Option<Progress>> {
        if self.done {
            return Ok(None);
        }
        let payload = match read_frame(&mut self.stream).await? {
            Some(payload) => payload,
            None => {
                self.done = true;
                return Ok(None);
            }
        };
        match decode_frame(&payload)? {
            RpcFrame::Notification(note) => {
                let params = note.params.unwrap_or(serde_json::Value::Null);
                let event: Progress = serde_json::from_value(params)?;
                self.index_id = Some(event.id);
                Ok(Some(event))
            }
            RpcFrame::Response(response) => {
                self.done = true;
                let value = unpack_response(response)?;
                let event: Progress = serde_json::from_value(value)?;
                self.index_id = Some(event.id);
                Ok(Some(event))
            }
        }
    }

    /// Drain the stream, returning every event in order.
    pub async fn collect(mut self) -> Result<Vec<Progress>> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await? {
            events.push(event);
        }
        Ok(events)
    }
}

/// Typed wrapper for the `inventory.*` methods.
#[derive(Clone)]
pub struct InventoryClient {
    channel: Arc<RpcChannel>,
}

impl InventoryClient {
    /// Start a crawl and return its progress stream.
    ///
    /// Opens a dedicated connection: the shared channel stays free for
    /// unary calls while the stream is live.
    pub async fn create(
        &self,
        import_target: Option<&str>,
        background: bool,
    ) -> Result<ProgressStream> {
        let stream = tokio::time::timeout(
            RpcConfig::CONNECT_TIMEOUT,
            TcpStream::connect(self.channel.addr()),
        )
        .await
        .map_err(|_| SurveyorError::Connectivity {
            message: format!("connect to {} timed out", self.channel.addr()),
        })?
        .map_err(|e| SurveyorError::Connectivity {
            message: format!("connect to {} failed: {}", self.channel.addr(), e),
        })?;

        let mut stream = stream;
        let request = RpcRequest::new(
            "inventory.create",
            serde_json::json!({
                "import_target": import_target,
                "background": background,
            }),
            1,
        );
        let request_bytes = serde_json::to_vec(&request)?;
        write_frame(&mut stream, &request_bytes).await?;

        Ok(ProgressStream {
            stream,
            index_id: None,
            done: false,
        })
    }

    /// All inventory indices, oldest first.
    pub async fn list(&self) -> Result<Vec<InventoryIndex>> {
        let value = self
            .channel
            .call("inventory.list", serde_json::json!({}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get(&self, id: i64) -> Result<InventoryIndex> {
        let value = self
            .channel
            .call("inventory.get", serde_json::json!({"id": id}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Delete a terminal index, returning the removed record.
    pub async fn delete(&self, id: i64) -> Result<InventoryIndex> {
        let value = self
            .channel
            .call("inventory.delete", serde_json::json!({"id": id}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Typed wrapper for the `explain.*` methods.
#[derive(Clone)]
pub struct ExplainClient {
    channel: Arc<RpcChannel>,
}

impl ExplainClient {
    /// Liveness probe for the explain service.
    pub async fn ping(&self) -> Result<String> {
        let value = self
            .channel
            .call("explain.ping", serde_json::json!({}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Typed wrapper for the `playground.*` methods.
#[derive(Clone)]
pub struct PlaygroundClient {
    channel: Arc<RpcChannel>,
}

impl PlaygroundClient {
    /// Liveness probe for the playground service.
    pub async fn ping(&self) -> Result<String> {
        let value = self
            .channel
            .call("playground.ping", serde_json::json!({}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// One connection, every service: the composed client surface.
#[derive(Clone)]
pub struct ClientComposition {
    channel: Arc<RpcChannel>,
}

impl ClientComposition {
    /// Connect to a running server.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let channel = Arc::new(RpcChannel::connect(addr).await?);
        Ok(Self { channel })
    }

    pub fn inventory(&self) -> InventoryClient {
        InventoryClient {
            channel: self.channel.clone(),
        }
    }

    pub fn explain(&self) -> ExplainClient {
        ExplainClient {
            channel: self.channel.clone(),
        }
    }

    pub fn playground(&self) -> PlaygroundClient {
        PlaygroundClient {
            channel: self.channel.clone(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.channel.addr()
    }
}
