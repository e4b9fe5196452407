//! Error types for local persistence.

use thiserror::Error;

/// Errors raised by the document and position stores.
///
/// Any of these aborts the cycle that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected an operation
    #[error("storage {operation} failed for '{path}': {message}")]
    Backend {
        operation: &'static str,
        path: String,
        message: String,
    },

    /// A value could not be serialized for storage
    #[error("failed to encode '{path}': {message}")]
    Encode { path: String, message: String },

    /// Storage could not be set up from configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn backend(operation: &'static str, path: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation,
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn encode(path: &str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
