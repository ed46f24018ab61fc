//! Error types for SnapGif

use thiserror::Error;

/// Main error type for SnapGif operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Frame size mismatch: expected {expected} pixels, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Invalid encoder state: {0}")]
    InvalidState(&'static str),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SnapGif's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create a frame size mismatch error
    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        Error::FrameSizeMismatch { expected, actual }
    }
}
