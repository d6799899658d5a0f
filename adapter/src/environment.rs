//! Adapter environment.
//!
//! Collaborators and shared configuration injected into the session reducer.

use crate::config::AdapterConfig;
use crate::providers::{AuthenticationProvider, MailProvider, RegistrationStore, ReplayGuard};
use farm_mfa_core::environment::Clock;
use std::sync::Arc;

/// Everything a session handler may consult.
///
/// # Type Parameters
///
/// - `P`: authentication provider hub
/// - `R`: registration store
/// - `M`: mail provider
/// - `G`: replay guard
#[derive(Clone)]
pub struct AdapterEnvironment<P, R, M, G>
where
    P: AuthenticationProvider + Clone,
    R: RegistrationStore + Clone,
    M: MailProvider + Clone,
    G: ReplayGuard + Clone,
{
    /// Second-factor channels
    pub providers: P,

    /// Persisted registrations
    pub registrations: R,

    /// Notification mails
    pub mailer: M,

    /// Replay check
    pub replay: G,

    /// Configuration parsed at pipeline load
    pub config: Arc<AdapterConfig>,

    /// Time source for logon dates and the delivery window
    pub clock: Arc<dyn Clock>,
}

impl<P, R, M, G> AdapterEnvironment<P, R, M, G>
where
    P: AuthenticationProvider + Clone,
    R: RegistrationStore + Clone,
    M: MailProvider + Clone,
    G: ReplayGuard + Clone,
{
    /// Create a new environment.
    #[must_use]
    pub fn new(
        providers: P,
        registrations: R,
        mailer: M,
        replay: G,
        config: Arc<AdapterConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            registrations,
            mailer,
            replay,
            config,
            clock,
        }
    }
}
