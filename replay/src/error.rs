//! Error types for the replay subsystem.

use thiserror::Error;

/// Errors raised by feeds, caches and farm peers.
///
/// None of these reach the request path: [`crate::ReplaySet::add_to_replay`]
/// is infallible, and the background loops log and retry on the next cycle.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// HTTP transport failure (feed download or peer call).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote side answered with a non-success status.
    #[error("{url} answered with status {status}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// A downloaded feed could not be parsed.
    #[error("Invalid {feed} feed: {reason}")]
    InvalidFeed {
        /// Feed name
        feed: &'static str,
        /// Parse failure
        reason: String,
    },

    /// Cache file access failed.
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Cache or wire payload could not be (de)serialized.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encrypting or decrypting a protected cache failed.
    #[error("Cache encryption failed: {0}")]
    Crypto(String),

    /// The local notification channel has no listener left.
    #[error("Notification could not be delivered: {0}")]
    Notification(String),
}

/// Result type for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;
