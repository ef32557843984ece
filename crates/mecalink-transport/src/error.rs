use std::time::Duration;

use crate::traits::Endpoint;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// The connect attempt did not complete in time.
    #[error("connect to {endpoint} timed out after {after:?}")]
    TimedOut { endpoint: Endpoint, after: Duration },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint string could not be parsed as `host:port`.
    #[error("invalid endpoint {0:?} (expected host:port)")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
