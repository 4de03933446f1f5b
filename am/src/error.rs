//! Messager error types

use serde_json::Value;
use thiserror::Error;

use crate::message::MessageType;
use crate::strategy::Operation;

/// Errors surfaced by the messager and its transports
#[derive(Debug, Error)]
pub enum MessagerError {
    /// No matching response arrived in time; `payload` is the fallback body
    #[error("Request timed out: type={message_type} request_id={}", request_id.as_deref().unwrap_or("-"))]
    Timeout {
        message_type: MessageType,
        request_id: Option<String>,
        payload: Value,
    },

    #[error("Message type is undefined")]
    MissingMessageType,

    #[error("Operation not implemented: {0}")]
    NotImplemented(Operation),

    #[error("Request {request_id} is already pending for type {message_type}")]
    DuplicateRequestId {
        message_type: MessageType,
        request_id: String,
    },

    #[error("Messager destroyed while request was pending")]
    Destroyed,

    #[error("Response channel closed")]
    ChannelClosed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MessagerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MessagerError::Timeout { .. })
    }

    /// The fallback body carried by a timeout, if this is one
    pub fn timeout_payload(&self) -> Option<&Value> {
        match self {
            MessagerError::Timeout { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Result alias for messager operations
pub type Result<T> = std::result::Result<T, MessagerError>;
