//! Session actions.
//!
//! Commands come from the host entry points; events carry the results of
//! provider, store and mail effects back into the reducer.

use crate::state::{ProofData, Registration};
use serde::{Deserialize, Serialize};

/// Response code of a provider call.
///
/// Provider failures never cross the provider boundary as errors; they are
/// folded into [`ResponseKind::Error`] so retry accounting is uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// The request was accepted or the proof was valid.
    Success,
    /// The proof was wrong.
    Failure,
    /// The provider could not be reached.
    Error,
}

/// Input to the session reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    // ═══════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════
    /// `IsAvailableForUser`: load the registration and compute the initial mode.
    Initialize,

    /// `BeginAuthentication`: resolve `PreSet` or `Locking` into a page.
    Begin {
        /// The request URL carried the options marker
        options_requested: bool,
    },

    /// `TryEndAuthentication`: a form was posted on the current page.
    Submit {
        /// Posted fields
        form: ProofData,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════
    /// The registration store answered.
    RegistrationLoaded {
        /// `None` when the user is not registered
        registration: Option<Registration>,
    },

    /// The registration store failed.
    RegistrationLoadFailed {
        /// Underlying error
        reason: String,
    },

    /// The selected provider handled `PostAuthenticationRequest`.
    CodeRequested {
        /// Provider response
        response: ResponseKind,
    },

    /// A two-way provider verified the user without code entry.
    TwoWayVerified {
        /// Provider response
        response: ResponseKind,
    },

    /// The selected provider checked a submitted code.
    CodeVerified {
        /// Provider response
        response: ResponseKind,
        /// Submitted code, kept for the replay check
        code: String,
        /// Submitted companion PIN
        pin: Option<String>,
    },

    /// The replay guard answered.
    ReplayChecked {
        /// `Success` for a novel code, `Failure` for a replay, `Error` when unavailable
        outcome: ResponseKind,
    },

    /// The enrollment notice was mailed (or failed to be).
    NotificationDelivered {
        /// Whether the mail went out
        delivered: bool,
    },

    /// A wizard asked the provider to send a verification code.
    EnrollmentCodeSent {
        /// Provider response
        response: ResponseKind,
    },

    /// A wizard verification completed.
    EnrollmentVerified {
        /// Provider response
        response: ResponseKind,
    },

    /// The registration store accepted a write.
    RegistrationSaved {
        /// Registration as stored
        registration: Registration,
    },

    /// The registration store rejected a write.
    RegistrationFailed {
        /// Underlying error
        reason: String,
    },

    /// The administrators were mailed.
    AdministrativeRequestSent {
        /// Whether the mail went out
        delivered: bool,
    },

    /// A new key was issued and mailed.
    KeyReissued {
        /// Registration as stored; `None` when the store refused the new key
        registration: Option<Registration>,
        /// Whether the key mail went out
        mailed: bool,
    },

    /// The directory answered a password change.
    PasswordChanged {
        /// Whether the password was changed
        success: bool,
    },
}
