//! Collaborator traits.
//!
//! The reducer never performs I/O. It describes calls to these traits as
//! effects, and the driver runs them with the environment's
//! implementations:
//!
//! - [`AuthenticationProvider`]: the second-factor channels
//! - [`RegistrationStore`]: persisted MFA profiles and directory passwords
//! - [`MailProvider`]: enrollment notices, administrative requests, keys
//! - [`ReplayGuard`]: the replay check of submitted codes
//!
//! Production code plugs in real services; tests use the mocks behind the
//! `test-utils` feature.

use crate::constants::event_ids;
use crate::actions::ResponseKind;
use crate::error::Result;
use crate::state::{KeyStatus, PreferredMethod, Registration, SessionState};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

pub mod authentication;
pub mod mail;
pub mod registration;
pub mod replay;

pub use authentication::{AuthenticationProvider, Capabilities, UiElement};
pub use mail::MailProvider;
pub use registration::RegistrationStore;
pub use replay::{FarmReplayGuard, PeerReplayGuard, ReplayGuard};

/// What a provider needs to know about the user for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    /// User principal name
    pub upn: String,
    /// Channel the call is for
    pub method: PreferredMethod,
    /// Address for e-mail codes
    pub mail_address: Option<String>,
    /// Number for the external gateway
    pub phone_number: Option<String>,
    /// Shared-secret key state
    pub key_status: KeyStatus,
    /// Client address
    pub ip_address: IpAddr,
    /// Start of the attempt
    pub logon_date: DateTime<Utc>,
}

impl ProviderContext {
    /// Context for `method` built from the session's mirrored registration.
    #[must_use]
    pub fn from_session(state: &SessionState, method: PreferredMethod) -> Self {
        Self {
            upn: state.upn.clone(),
            method,
            mail_address: state.mail_address.clone(),
            phone_number: state.phone_number.clone(),
            key_status: state.key_status,
            ip_address: state.ip_address,
            logon_date: state.logon_date,
        }
    }

    /// Context for `method` built from a wizard's working registration.
    #[must_use]
    pub fn from_registration(
        state: &SessionState,
        registration: &Registration,
        method: PreferredMethod,
    ) -> Self {
        Self {
            upn: registration.upn.clone(),
            method,
            mail_address: registration.mail_address.clone(),
            phone_number: registration.phone_number.clone(),
            key_status: registration.key_status,
            ip_address: state.ip_address,
            logon_date: state.logon_date,
        }
    }
}

/// Fold a provider result into a response code, logging failures.
#[must_use]
pub fn settle(upn: &str, method: PreferredMethod, result: Result<ResponseKind>) -> ResponseKind {
    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                event_id = event_ids::PROVIDER_FAILED,
                upn = %upn,
                %method,
                error = %e,
                "Provider call failed"
            );
            ResponseKind::Error
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;

    #[test]
    fn provider_errors_become_sentinels() {
        assert_eq!(
            settle("bob", PreferredMethod::Email, Err(AdapterError::Provider("smtp".into()))),
            ResponseKind::Error
        );
        assert_eq!(
            settle("bob", PreferredMethod::Email, Ok(ResponseKind::Failure)),
            ResponseKind::Failure
        );
    }

    #[test]
    fn registration_context_prefers_working_copy() {
        let mut state = SessionState::new("bob", "10.0.0.1".parse().unwrap(), Utc::now());
        state.mail_address = Some("old@contoso.com".into());
        let working = Registration::new("bob").with_mail("new@contoso.com");

        let context = ProviderContext::from_registration(&state, &working, PreferredMethod::Email);
        assert_eq!(context.mail_address.as_deref(), Some("new@contoso.com"));
        assert_eq!(context.ip_address, state.ip_address);
    }
}
