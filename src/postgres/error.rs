//! Postgres driver errors

use crate::protocol::ErrorFields;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`PgDriver`](super::PgDriver)
#[derive(Debug, Error)]
pub enum PgError {
    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected or malformed message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication rejected or unsupported
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// ErrorResponse from the server
    #[error("server error: {0}")]
    Server(ErrorFields),

    /// Server closed the socket
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Connect plus startup took longer than the configured limit
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Operation not allowed in the session's current state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

impl PgError {
    /// SQLSTATE code of a server error
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            PgError::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }
}
