//! Error types for the authentication adapter.

use farm_mfa_runtime::DriverError;
use thiserror::Error;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors raised by the adapter and its collaborators.
///
/// Only [`AdapterError::Authentication`] and [`AdapterError::DefinitiveError`]
/// cross the host boundary; every other variant is produced by a
/// collaborator and either converted into a retryable response inside the
/// state machine or wrapped before it reaches the host.
#[derive(Debug, Error)]
pub enum AdapterError {
    // ═══════════════════════════════════════════════════════════
    // Host-visible errors
    // ═══════════════════════════════════════════════════════════
    /// The session failed; the host must not trust any partial state.
    #[error("Authentication failed for {upn}: {message}")]
    Authentication {
        /// User principal name of the session
        upn: String,
        /// Underlying failure
        message: String,
    },

    /// The session reached the terminal error of the locking path.
    #[error("Authentication refused for {upn}: {reason}")]
    DefinitiveError {
        /// User principal name of the session
        upn: String,
        /// Message key explaining the refusal
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Collaborator errors
    // ═══════════════════════════════════════════════════════════
    /// The adapter configuration is missing or invalid.
    #[error("Invalid adapter configuration: {0}")]
    Configuration(String),

    /// The opaque host context does not hold a usable session.
    #[error("Session context is missing or corrupt: {0}")]
    Context(String),

    /// An authentication provider could not be reached.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The registration store failed.
    #[error("Registration store error: {0}")]
    Registration(String),

    /// A mail could not be delivered.
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// The replay check could not be performed.
    #[error("Replay check unavailable: {0}")]
    Replay(#[from] farm_mfa_replay::ReplayError),

    /// The state machine did not settle.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl AdapterError {
    /// Wrap any error as a host-visible authentication failure for `upn`.
    #[must_use]
    pub fn wrap(upn: &str, error: impl std::fmt::Display) -> Self {
        Self::Authentication {
            upn: upn.to_string(),
            message: error.to_string(),
        }
    }

    /// Whether this error is one the host sees as-is.
    #[must_use]
    pub const fn is_host_visible(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::DefinitiveError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_upn_and_message() {
        let err = AdapterError::wrap("alice@contoso.com", AdapterError::Provider("timeout".into()));
        assert!(err.is_host_visible());
        assert_eq!(
            err.to_string(),
            "Authentication failed for alice@contoso.com: Provider error: timeout"
        );
    }

    #[test]
    fn collaborator_errors_are_not_host_visible() {
        assert!(!AdapterError::Mail("smtp down".into()).is_host_visible());
        assert!(!AdapterError::from(DriverError::StepLimitExceeded(64)).is_host_visible());
    }
}
