use serde::Serialize;
use thiserror::Error;

use crate::common::types::{SessionId, now_ms};

/// Why a resume attempt was refused. The handshake layer answers all of
/// these by starting a fresh session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResumeError {
    #[error("no resumable session with id {0}")]
    UnknownSession(SessionId),
    #[error("resume key does not match session {0}")]
    KeyMismatch(SessionId),
    #[error("session {0} is destroyed")]
    Destroyed(SessionId),
    /// The session still has a live transport.
    #[error("session {0} is not paused")]
    NotPaused(SessionId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is destroyed")]
    Destroyed(SessionId),
    /// Resume settings are fixed while a pause episode is running.
    #[error("session {0} is paused")]
    Paused(SessionId),
}

/// JSON error body returned by the REST routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Not Found").
    pub error: String,
    pub message: String,
    pub path: String,
}

impl RelayError {
    fn with_status(status: u16, error: &str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status,
            error: error.into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_status(400, "Bad Request", message, path)
    }

    pub fn unauthorized(path: impl Into<String>) -> Self {
        Self::with_status(401, "Unauthorized", "Unauthorized", path)
    }

    pub fn conflict(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_status(409, "Conflict", message, path)
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_status(404, "Not Found", message, path)
    }
}
