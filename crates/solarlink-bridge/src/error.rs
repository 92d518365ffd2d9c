//! Error type for bridge operations.

use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error type for the telemetry bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Broker connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish failed for a topic
    #[error("Publish error on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscription failed for a topic
    #[error("Subscription error on {topic}: {reason}")]
    Subscription { topic: String, reason: String },

    /// Device not present in the inventory, or not addressable
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Fatal session failure (credential rejection); requires a fresh
    /// session with refreshed credentials
    #[error("Session error: {0}")]
    Session(String),

    /// The bridge has been stopped
    #[error("Bridge is stopped")]
    Stopped,
}
