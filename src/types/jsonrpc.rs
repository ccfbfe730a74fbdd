//! The JSON-RPC 2.0 wire frame and the identifier/classification rules from
//! spec.md §3.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// A request/response identifier. Preserves numeric-vs-string typing across
/// the round trip (P2 in spec.md §8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Integer(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Integer(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The raw frame as it appears on the wire: one `serde_json::Value` object
/// with optional `id`/`method`/`params`/`result`/`error` fields. Classified
/// into [`Message`] after parsing per the §3 invariant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawMessage {
    pub jsonrpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct JsonRpcError {
    pub id: RequestId,
    pub error: JsonRpcErrorObject,
}

/// A classified inbound/outbound frame. Construction from a [`RawMessage`]
/// enforces the §3 classification invariant: every frame is exactly one of
/// these three, or it is malformed.
#[derive(Debug, Clone)]
pub enum Message {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(Result<JsonRpcResponse, JsonRpcError>),
}

/// A frame failed to classify as request, notification, or response. The
/// router logs and drops these; they are never escalated to a handler.
#[derive(Debug, thiserror::Error)]
#[error("malformed JSON-RPC frame: {0}")]
pub struct MalformedFrame(pub String);

impl Message {
    pub fn classify(raw: RawMessage) -> Result<Message, MalformedFrame> {
        let has_id = raw.id.is_some();
        let has_method = raw.method.is_some();
        let has_result = raw.result.is_some();
        let has_error = raw.error.is_some();

        match (has_id, has_method, has_result, has_error) {
            (true, true, false, false) => Ok(Message::Request(JsonRpcRequest {
                id: raw.id.expect("checked above"),
                method: raw.method.expect("checked above"),
                params: raw.params,
            })),
            (false, true, false, false) => Ok(Message::Notification(JsonRpcNotification {
                method: raw.method.expect("checked above"),
                params: raw.params,
            })),
            (true, false, true, false) => Ok(Message::Response(Ok(JsonRpcResponse {
                id: raw.id.expect("checked above"),
                result: raw.result.expect("checked above"),
            }))),
            (true, false, false, true) => Ok(Message::Response(Err(JsonRpcError {
                id: raw.id.expect("checked above"),
                error: raw.error.expect("checked above"),
            }))),
            _ => Err(MalformedFrame(format!(
                "id={has_id} method={has_method} result={has_result} error={has_error}"
            ))),
        }
    }

    pub fn into_raw(self) -> RawMessage {
        match self {
            Message::Request(req) => RawMessage {
                jsonrpc: Some(JSONRPC_VERSION.to_string()),
                id: Some(req.id),
                method: Some(req.method),
                params: req.params,
                result: None,
                error: None,
            },
            Message::Notification(n) => RawMessage {
                jsonrpc: Some(JSONRPC_VERSION.to_string()),
                id: None,
                method: Some(n.method),
                params: n.params,
                result: None,
                error: None,
            },
            Message::Response(Ok(resp)) => RawMessage {
                jsonrpc: Some(JSONRPC_VERSION.to_string()),
                id: Some(resp.id),
                method: None,
                params: None,
                result: Some(resp.result),
                error: None,
            },
            Message::Response(Err(err)) => RawMessage {
                jsonrpc: Some(JSONRPC_VERSION.to_string()),
                id: Some(err.id),
                method: None,
                params: None,
                result: None,
                error: Some(err.error),
            },
        }
    }

    /// Parse one frame from a single-line JSON payload.
    pub fn from_line(line: &str) -> Result<Message, MalformedFrame> {
        let raw: RawMessage = serde_json::from_str(line)
            .map_err(|e| MalformedFrame(format!("invalid JSON: {e}")))?;
        Message::classify(raw)
    }

    /// Serialize one frame to a single-line JSON payload (no trailing
    /// newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.clone().into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let raw: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "ping"
        }))
        .unwrap();
        assert!(matches!(Message::classify(raw), Ok(Message::Request(_))));
    }

    #[test]
    fn classifies_notification() {
        let raw: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(matches!(
            Message::classify(raw),
            Ok(Message::Notification(_))
        ));
    }

    #[test]
    fn classifies_success_response() {
        let raw: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}
        }))
        .unwrap();
        assert!(matches!(
            Message::classify(raw),
            Ok(Message::Response(Ok(_)))
        ));
    }

    #[test]
    fn classifies_error_response() {
        let raw: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "nope"}
        }))
        .unwrap();
        assert!(matches!(
            Message::classify(raw),
            Ok(Message::Response(Err(_)))
        ));
    }

    #[test]
    fn rejects_ambiguous_frame() {
        let raw: RawMessage = serde_json::from_value(json!({"jsonrpc": "2.0"})).unwrap();
        assert!(Message::classify(raw).is_err());
    }

    #[test]
    fn string_identifier_round_trips() {
        let raw: RawMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": "abc", "result": {}
        }))
        .unwrap();
        let msg = Message::classify(raw).unwrap();
        let back = msg.into_raw();
        assert_eq!(back.id, Some(RequestId::String("abc".to_string())));
    }
}
