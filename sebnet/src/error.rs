//! Error types for SEBNet operations.
//!
//! This module defines the error types used throughout the SEBNet
//! implementation, providing structured error handling for model
//! construction, configuration validation, and data loading.

use thiserror::Error;

/// Errors that can occur during SEBNet model operations.
#[derive(Error, Debug)]
pub enum SebNetError {
    /// Invalid model configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error.
        reason: String,
    },

    /// Tensor shape mismatch during forward pass.
    #[error("Invalid tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// Expected tensor shape description.
        expected: String,
        /// Actual tensor shape description.
        actual: String,
    },

    /// Model initialization failed.
    #[error("Model initialization failed: {reason}")]
    ModelInitializationFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// Dataset loading or processing error.
    #[error("Dataset error: {message}")]
    DatasetError {
        /// Error message.
        message: String,
    },
}

/// Result type alias for SEBNet operations.
pub type SebNetResult<T> = Result<T, SebNetError>;
