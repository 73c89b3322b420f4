//! Error types for sith-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for sith-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend session rejected a request (bad link, load failure, ...)
    #[error("Session error: {0}")]
    Session(String),

    /// Collection index past the end (the collection shrank under us)
    #[error("Track index {index} out of range for collection of {len}")]
    TrackIndexOutOfRange { index: usize, len: usize },

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Sample type the output pipeline cannot render
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Request arrived after shutdown started
    #[error("Player is shutting down")]
    ShuttingDown,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from sith-common
    #[error(transparent)]
    Common(#[from] sith_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using sith-ap Error
pub type Result<T> = std::result::Result<T, Error>;
