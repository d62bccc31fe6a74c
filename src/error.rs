//! Error types for the unsubscribe engine.

use crate::browser::BrowserError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
/// Error type for fallible operations outside the removal flow.
pub enum Error {
    /// HTTP transport could not be set up.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Browser automation could not be set up.
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    /// IO error when reading or writing data.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Parse error with a message.
    #[error("parse error: {0}")]
    Parse(String),
    /// Mail retrieval collaborator failure.
    #[error("mailbox error: {0}")]
    Mailbox(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
