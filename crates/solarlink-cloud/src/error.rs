//! Error type for vendor API operations.

use thiserror::Error;

/// Result type for vendor API operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Error type for the vendor REST collaborators.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The vendor API answered with a non-success status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Disk cache I/O failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
