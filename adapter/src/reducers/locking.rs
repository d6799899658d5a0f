//! The locking resolution.
//!
//! `Locking` is where every refusal converges. Unless the definitive error
//! is already the target, the feature flags decide whether the user is let
//! through (`Bypass`), invited to ask for access (`Invitation`) or refused.

use super::{SessionEffects, SessionReducer, definitive_error, refuse};
use crate::environment::AdapterEnvironment;
use crate::providers::{AuthenticationProvider, MailProvider, RegistrationStore, ReplayGuard};
use crate::state::{Message, MessageKey, SessionState, UiMode};
use farm_mfa_core::{effect::Effect, smallvec};

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    pub(super) fn resolve_locking(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        if state.target_mode == Some(UiMode::DefinitiveError) {
            state.go_to(UiMode::Locking);
            if state.message.is_none() {
                state.message = Some(Message::error(MessageKey::TooManyRetries));
            }
            return smallvec![Effect::None];
        }

        let features = &env.config.features;
        let (bypass, invite, refusal) = if !state.is_registered {
            (
                features.bypass_unregistered,
                features.allow_unregistered || features.administrative_mode,
                MessageKey::NotRegistered,
            )
        } else if !state.enabled {
            (features.bypass_disabled, features.allow_disabled, MessageKey::AccountDisabled)
        } else {
            (false, false, MessageKey::NoUsableMethod)
        };

        if bypass {
            tracing::info!(upn = %state.upn, registered = state.is_registered, "Second factor bypassed");
            state.go_to(UiMode::Bypass);
        } else if invite {
            state.go_to(UiMode::Invitation);
        } else {
            refuse(state, Message::error(refusal));
        }
        smallvec![Effect::None]
    }

    /// `Locking` posted: raise the definitive error or resolve again.
    pub(super) fn try_locking(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        if state.target_mode == Some(UiMode::DefinitiveError) {
            return definitive_error(state);
        }
        self.resolve_locking(state, env)
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::SessionAction;
    use crate::config::{AdapterConfig, UserFeatures};
    use crate::environment::AdapterEnvironment;
    use crate::mocks::{MockMailProvider, MockProviderHub, MockRegistrationStore, MockReplayGuard};
    use crate::reducers::SessionReducer;
    use crate::state::{Registration, SessionState, UiMode};
    use farm_mfa_core::environment::Clock;
    use farm_mfa_testing::{ReducerTest, assertions, test_clock};
    use std::sync::Arc;

    type Env = AdapterEnvironment<MockProviderHub, MockRegistrationStore, MockMailProvider, MockReplayGuard>;

    fn env(features: UserFeatures) -> Env {
        AdapterEnvironment::new(
            MockProviderHub::new(),
            MockRegistrationStore::new(),
            MockMailProvider::new(),
            MockReplayGuard::new(),
            Arc::new(AdapterConfig::default().with_features(features)),
            Arc::new(test_clock()),
        )
    }

    fn locked(registration: Option<Registration>) -> SessionState {
        let mut state = SessionState::new("carol@contoso.com", "10.0.0.3".parse().unwrap(), test_clock().now());
        if let Some(registration) = registration {
            state.apply_registration(&registration);
        }
        state.go_to(UiMode::Locking);
        state
    }

    fn begin() -> SessionAction {
        SessionAction::Begin { options_requested: false }
    }

    #[test]
    fn unregistered_bypass() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(UserFeatures {
                bypass_unregistered: true,
                ..UserFeatures::default()
            }))
            .given_state(locked(None))
            .when_action(begin())
            .then_state(|state| assert_eq!(state.ui_mode, UiMode::Bypass))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn administrative_mode_invites_unregistered() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(UserFeatures {
                administrative_mode: true,
                ..UserFeatures::default()
            }))
            .given_state(locked(None))
            .when_action(begin())
            .then_state(|state| assert_eq!(state.ui_mode, UiMode::Invitation))
            .run();
    }

    #[test]
    fn disabled_without_flags_is_refused() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(UserFeatures {
                bypass_unregistered: true,
                ..UserFeatures::default()
            }))
            .given_state(locked(Some(Registration::new("carol@contoso.com").with_enabled(false))))
            .when_action(begin())
            .then_state(|state| {
                assert_eq!(state.ui_mode, UiMode::Locking);
                assert_eq!(state.target_mode, Some(UiMode::DefinitiveError));
            })
            .run();
    }

    #[test]
    fn locking_with_definitive_target_raises() {
        let mut state = locked(None);
        state.target_mode = Some(UiMode::DefinitiveError);

        ReducerTest::new(SessionReducer::new())
            .with_env(env(UserFeatures::default()))
            .given_state(state)
            .when_action(SessionAction::Submit { form: Default::default() })
            .then_state(|state| {
                assert_eq!(state.ui_mode, UiMode::DefinitiveError);
                assert!(state.output.fault.is_some());
            })
            .run();
    }
}
