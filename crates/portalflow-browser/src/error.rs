//! Error types for the browser resource

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser could not be launched: {0}")]
    Launch(String),

    #[error("Timed out after {timeout_ms} ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{0}")]
    Interaction(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Browser page is closed")]
    Closed,

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrowserError>;
