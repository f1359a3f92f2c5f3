//! Error types for the service.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the service.
///
/// Write-behind workers log `Store` errors and drop the task; read-through
/// lookups propagate them to the front end, which answers 500.  Nothing in
/// the core retries.
#[derive(Error, Debug)]
pub enum Error {
    /// Durable store error (statement failure, broken session).
    #[error("durable store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// I/O error (listener setup, request streams).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure binding or running the HTTP front end.
    #[error("HTTP front end error: {0}")]
    Http(String),
}

impl From<mysql::Error> for Error {
    fn from(e: mysql::Error) -> Self {
        Error::Store(Box::new(e))
    }
}
