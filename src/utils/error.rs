//! Error types and handling
//!
//! Error taxonomy shared by every layer of the recorder. Synchronous requests
//! surface these as structured failure results; failures that happen while a
//! capture runs unattended are pushed as events instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Option values rejected before anything is spawned
    #[error("Invalid recording options: {0}")]
    Validation(String),

    /// No capturable source, device missing, or a session is already active
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Request is not legal in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cannot access output directory {path}: {reason}")]
    DirectoryAccess { path: String, reason: String },

    /// Encoder exited abnormally outside of a deliberate stop
    #[error("Encoder process error: {0}")]
    EncoderProcess(String),

    #[error("Recording file is empty: {0}")]
    EmptyOutput(String),

    #[error("Finalize failed: {0}")]
    Finalize(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecorderError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::Validation(_) => "VALIDATION_ERROR",
            RecorderError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            RecorderError::InvalidState(_) => "INVALID_STATE",
            RecorderError::DirectoryAccess { .. } => "DIRECTORY_ACCESS_ERROR",
            RecorderError::EncoderProcess(_) => "ENCODER_PROCESS_ERROR",
            RecorderError::EmptyOutput(_) => "EMPTY_OUTPUT_ERROR",
            RecorderError::Finalize(_) => "FINALIZE_ERROR",
            RecorderError::Settings(_) => "SETTINGS_ERROR",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub(crate) fn directory(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        RecorderError::DirectoryAccess {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Error response for the request boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&RecorderError> for ErrorResponse {
    fn from(error: &RecorderError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        ErrorResponse::from(&error)
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
