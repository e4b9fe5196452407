//! Error types for live interface calls.

use crate::retry::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection refused, DNS failure, timeout, broken body stream
    #[error("request to '{url}' failed: {message}")]
    Transport { url: String, message: String },

    /// The live interface answered 404 for the requested resource
    #[error("'{url}' not found")]
    NotFound { url: String },

    /// Any other non-success status
    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The payload could not be parsed or did not describe what was asked for
    #[error("malformed response from '{url}': {message}")]
    Malformed { url: String, message: String },
}

impl RemoteError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(url: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(url: &str, status: u16) -> Self {
        if status == 404 {
            Self::NotFound {
                url: url.to_string(),
            }
        } else {
            Self::Status {
                url: url.to_string(),
                status,
            }
        }
    }
}

impl Retryable for RemoteError {
    /// Transport failures, 5xx and 429 may clear up on their own; a 404 or a
    /// malformed payload will not within the same cycle.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound { .. } | Self::Malformed { .. } => false,
        }
    }
}
