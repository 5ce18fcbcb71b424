//! Error types

use thiserror::Error;

/// Boxed error produced by a driver or credential source
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Credential resolution, endpoint parsing or expiration window is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The driver failed to establish the connection or produce a statement
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),
}

impl Error {
    /// Wrap a driver error
    pub fn connection(err: impl Into<BoxError>) -> Self {
        Error::Connection(err.into())
    }

    /// Is this a configuration error?
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Is this a connection error?
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
