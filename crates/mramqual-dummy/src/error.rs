//! Error types for the emulator

use thiserror::Error;

/// Emulator configuration errors
#[derive(Debug, Error)]
pub enum DummyError {
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown option key
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// The resulting layout cannot be qualified
    #[error("Invalid geometry: {0}")]
    Geometry(#[source] mramqual_core::Error),
}

/// Result type for emulator configuration
pub type Result<T> = std::result::Result<T, DummyError>;
