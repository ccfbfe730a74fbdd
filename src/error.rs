//! Protocol-layer error taxonomy.
//!
//! `McpError` covers both the five JSON-RPC 2.0 error codes that can cross
//! the wire (§6 of the spec) and a handful of runtime-only variants that a
//! caller of [`crate::peer::Peer::send_request`] or a feature façade may
//! observe but that never themselves become a wire error object.

use crate::types::jsonrpc::JsonRpcErrorObject;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// `send_request` returned because the peer was closed while the call
    /// was still pending.
    #[error("peer closed")]
    PeerClosed,

    /// `send_request` returned because the caller's cancellation context
    /// fired before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// A bounded outbound queue (e.g. the SSE server's broadcast buffer)
    /// was full when `send` was called.
    #[error("client message buffer full")]
    TransportFull,

    /// A feature façade call was attempted before the handshake completed,
    /// or for a feature the remote never declared.
    #[error("capability not declared: {0}")]
    CapabilityNotDeclared(String),
}

impl McpError {
    pub fn code(&self) -> i64 {
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) | McpError::CapabilityNotDeclared(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::Internal(_)
            | McpError::PeerClosed
            | McpError::Cancelled
            | McpError::TransportFull => INTERNAL_ERROR,
        }
    }

    /// Reconstructs a typed `McpError` from a wire error object's `code`
    /// and `message`, the inverse of `code()`/`Display`. Used by
    /// `Peer::send_request` so a remote's JSON-RPC error code (e.g.
    /// `InvalidParams` from a rejected `sampling/createMessage`) survives
    /// as the matching variant rather than collapsing into `Internal`.
    pub fn from_wire(code: i64, message: String) -> Self {
        match code {
            PARSE_ERROR => McpError::ParseError(message),
            INVALID_REQUEST => McpError::InvalidRequest(message),
            METHOD_NOT_FOUND => McpError::MethodNotFound(message),
            INVALID_PARAMS => McpError::InvalidParams(message),
            _ => McpError::Internal(message),
        }
    }
}

impl From<&McpError> for JsonRpcErrorObject {
    fn from(err: &McpError) -> Self {
        JsonRpcErrorObject {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<McpError> for JsonRpcErrorObject {
    fn from(err: McpError) -> Self {
        JsonRpcErrorObject::from(&err)
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
