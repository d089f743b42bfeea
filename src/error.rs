//! Error types for the board client.

use thiserror::Error;

/// Result type for board operations.
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors raised by the gateway, the store and the configuration layer.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The server answered 404 for the targeted entity.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Any other non-2xx answer, with the server-provided detail when present.
    #[error("request failed ({status}): {message}")]
    Request { status: u16, message: String },

    /// Connection, timeout or other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the wire schema.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// Rejected before any remote call was made.
    #[error("invalid value for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Undo requested for a delete whose grace window has closed.
    #[error("undo window closed for task {id}")]
    UndoExpired { id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BoardError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        BoardError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// The entity vanished server-side; recovery is a full refetch.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BoardError::NotFound { .. })
    }
}

impl From<reqwest::Error> for BoardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BoardError::Decode(err.to_string())
        } else {
            BoardError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BoardError {
    fn from(err: serde_json::Error) -> Self {
        BoardError::Decode(err.to_string())
    }
}
