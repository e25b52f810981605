use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::TempId;

/// Structured error body returned by the backend.
/// Every field except `error` and `message` is optional so older servers still parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Hint about what the correct usage looks like
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes the client itself emits into diagnostics.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NETWORK_ERROR: &str = "network_error";
    pub const TIMEOUT: &str = "timeout";
    pub const DECODE_FAILED: &str = "decode_failed";
    pub const REMOTE_ERROR: &str = "remote_error";
}

/// Input failed a local precondition. Never reaches the network and is never
/// logged as an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("query has {actual} characters, at least {min_chars} required")]
    QueryTooShort { min_chars: usize, actual: usize },
    #[error("payload is empty after trimming")]
    EmptyPayload,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        codes::VALIDATION_FAILED
    }
}

/// A collaborator call failed or returned an error payload. Always non-fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("remote error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Builds a `Status` error from a non-2xx response body, preferring the
    /// structured `ErrorBody` message when the body parses as one.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => match parsed.docs_hint {
                Some(hint) => format!("{} ({hint})", parsed.message),
                None => parsed.message,
            },
            Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
            Err(_) => body.trim().chars().take(200).collect(),
        };
        RemoteError::Status { status, message }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::Network(_) => codes::NETWORK_ERROR,
            RemoteError::Timeout(_) => codes::TIMEOUT,
            RemoteError::Status { .. } => codes::REMOTE_ERROR,
            RemoteError::Decode(_) => codes::DECODE_FAILED,
        }
    }

    /// Network failures, timeouts and 5xx responses may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status { status, .. } => *status >= 500,
            RemoteError::Decode(_) => false,
        }
    }
}

/// Misuse of the explicit retry/discard surface of the mutation coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("no mutation is tracked under {0}")]
    UnknownMutation(TempId),
    #[error("mutation {0} has not failed and cannot be retried or discarded")]
    NotFailed(TempId),
}
