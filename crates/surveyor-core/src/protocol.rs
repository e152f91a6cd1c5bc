//! Shared RPC protocol types and framing.
//!
//! Defines the wire format for the inventory service: 4-byte big-endian
//! length prefix followed by a UTF-8 JSON-RPC 2.0 payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Streaming calls interleave notification frames (requests without an id,
//! method [`RpcConfig::PROGRESS_METHOD`]) before the final response frame
//! that carries the call's id.

use crate::config::RpcConfig;
use crate::error::{Result, SurveyorError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// JSON-RPC 2.0 request. With `id: None` this is a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

impl RpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(serde_json::Value::Number(id.into())),
        }
    }

    /// Create a notification: a request with no id, which expects no
    /// response frame. Used server-to-client for progress events.
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: None,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    pub id: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object. `data` carries the index id for the error
/// codes that have one, so clients can rebuild the typed error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A decoded inbound frame, as seen by the client: either a server-pushed
/// notification or the response that completes a call.
#[derive(Debug, Clone)]
pub enum RpcFrame {
    Notification(RpcRequest),
    Response(RpcResponse),
}

/// Decode a frame payload, discriminating on the `method` field.
pub fn decode_frame(payload: &[u8]) -> Result<RpcFrame> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    if value.get("method").is_some() {
        let request: RpcRequest = serde_json::from_value(value)?;
        Ok(RpcFrame::Notification(request))
    } else {
        let response: RpcResponse = serde_json::from_value(value)?;
        Ok(RpcFrame::Response(response))
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Frame format: `[4-byte BE u32 length][payload bytes]`
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(SurveyorError::InvalidParams {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                RpcConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
///
/// Frame format: `[4-byte BE u32 length][payload bytes]`
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_request_serialization_roundtrip() {
        let req = RpcRequest::new("inventory.list", serde_json::json!({}), 1);
        let json = serde_json::to_string(&req).unwrap();
        let parsed: RpcRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.jsonrpc, "2.0");
        assert_eq!(parsed.method, "inventory.list");
        assert_eq!(parsed.id, Some(serde_json::Value::Number(1.into())));
    }

    #[test]
    fn test_notification_has_no_id_field() {
        let note = RpcRequest::notification(
            RpcConfig::PROGRESS_METHOD,
            serde_json::json!({"id": 7, "phase": "crawling"}),
        );
        let json = serde_json::to_string(&note).unwrap();

        assert!(!json.contains("\"id\":null"));
        assert!(json.contains("inventory.progress"));
    }

    #[test]
    fn test_decode_frame_discriminates_notifications() {
        let note = RpcRequest::notification(RpcConfig::PROGRESS_METHOD, serde_json::json!({}));
        let bytes = serde_json::to_vec(&note).unwrap();
        assert!(matches!(
            decode_frame(&bytes).unwrap(),
            RpcFrame::Notification(_)
        ));

        let resp = RpcResponse::success(
            Some(serde_json::Value::Number(1.into())),
            serde_json::json!([]),
        );
        let bytes = serde_json::to_vec(&resp).unwrap();
        assert!(matches!(decode_frame(&bytes).unwrap(), RpcFrame::Response(_)));
    }

    #[test]
    fn test_rpc_response_error_serialization() {
        let resp = RpcResponse::error(
            Some(serde_json::Value::Number(1.into())),
            -32001,
            "inventory index 4 not found".to_string(),
        );
        let json = serde_json::to_string(&resp).unwrap();

        assert!(!json.contains("\"result\""));
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32001"));
    }

    #[tokio::test]
    async fn test_frame_read_write_roundtrip() {
        let payload = b"hello world";
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();

        assert_eq!(read_back, Some(payload.to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        // Craft a frame header claiming a huge payload
        let huge_len: u32 = (RpcConfig::MAX_FRAME_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]); // some bytes but not enough

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
