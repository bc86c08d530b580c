//! Adapter error surface
//!
//! Retrieval treats every variant here as transient and recoverable; the
//! fallback chains in the retriever decide what happens next.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Backing service unreachable or refusing work
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded the adapter's own timeout
    #[error("adapter call timed out")]
    Timeout,

    /// Service answered with something we cannot interpret
    #[error("invalid adapter response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Unavailable(err.to_string())
        } else {
            AdapterError::InvalidResponse(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::InvalidResponse(err.to_string())
    }
}
