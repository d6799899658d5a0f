//! Account options, method choice, password change.

use super::{SessionEffects, SessionReducer, complete, not_allowed, refuse};
use crate::actions::SessionAction;
use crate::constants::{event_ids, fields};
use crate::environment::AdapterEnvironment;
use crate::providers::{AuthenticationProvider, MailProvider, ProviderContext, RegistrationStore, ReplayGuard};
use crate::state::{
    Claim, EnrollmentKind, EnrollmentPolicy, FormAction, KeyStatus, Message, MessageKey, PreferredMethod, ProofData,
    SessionState, UiMode,
};
use farm_mfa_core::{effect::Effect, smallvec};

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    pub(super) fn enter_options(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        state.working_registration = None;
        state.offered_methods = env
            .config
            .enabled_methods
            .iter()
            .copied()
            .filter(|method| {
                env.providers
                    .is_available(*method, &ProviderContext::from_session(state, *method))
            })
            .collect();
        let method = state.selected_method;
        state.account_management_url = env
            .providers
            .account_management_url(method, &ProviderContext::from_session(state, method));
        state.go_to(UiMode::SelectOptions);
        smallvec![Effect::None]
    }

    pub(super) fn try_select_options(
        &self,
        state: &mut SessionState,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let features = &env.config.features;
        match action {
            FormAction::Submit | FormAction::Cancel => {
                let method = state.selected_method;
                let mut claims = std::mem::take(&mut state.pending_claims);
                if claims.is_empty() {
                    claims.push(Claim::authentication_method(method));
                }
                complete(state, method, claims)
            },
            FormAction::Enroll => {
                let kind = form.get(fields::ENROLL).and_then(EnrollmentKind::parse).filter(|kind| {
                    *kind == EnrollmentKind::Pin || env.config.is_method_enabled(kind.method())
                });
                match kind {
                    Some(kind) => self.enter_wizard(state, kind, EnrollmentPolicy::Standard, env),
                    None => {
                        state.message = Some(Message::error(MessageKey::InvalidMethod));
                        smallvec![Effect::None]
                    },
                }
            },
            FormAction::ChangePassword if features.allow_change_password => {
                state.go_to(UiMode::ChangePassword);
                smallvec![Effect::None]
            },
            FormAction::ChooseDefault => {
                let method = form.get(fields::METHOD).and_then(PreferredMethod::parse).filter(|method| {
                    (method.is_primary() && env.config.is_method_enabled(*method))
                        || (*method == PreferredMethod::Choose && env.config.allow_choose)
                });
                let Some(method) = method else {
                    state.message = Some(Message::error(MessageKey::InvalidMethod));
                    return smallvec![Effect::None];
                };
                let mut registration = state.registration();
                registration.preferred_method = method;
                smallvec![self.save_registration(registration, false, env)]
            },
            FormAction::ShowQrCode if state.key_status != KeyStatus::NotSet => {
                state.go_to(UiMode::ShowQrCode);
                smallvec![Effect::None]
            },
            other => not_allowed(state, other),
        }
    }

    /// Use another method for this attempt.
    pub(super) fn try_choose_method(
        &self,
        state: &mut SessionState,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match action {
            FormAction::Submit => {
                let usable = self.usable_methods(state, env);
                let Some(method) = form
                    .get(fields::METHOD)
                    .and_then(PreferredMethod::parse)
                    .filter(|method| usable.contains(method))
                else {
                    state.offered_methods = usable;
                    state.message = Some(Message::error(MessageKey::InvalidMethod));
                    return smallvec![Effect::None];
                };

                state.override_method = Some(method);
                self.use_method(state, method, env);
                state.go_to(UiMode::SendAuthRequest);

                let mut effects = SessionEffects::new();
                if form.flag(fields::REMEMBER) && env.config.features.allow_manage_options {
                    let mut registration = state.registration();
                    registration.preferred_method = method;
                    effects.push(self.save_registration(registration, false, env));
                }
                effects.extend(self.request_code(state, env));
                effects
            },
            FormAction::Cancel => {
                refuse(state, Message::error(MessageKey::AuthenticationCancelled));
                smallvec![Effect::None]
            },
            other => not_allowed(state, other),
        }
    }

    pub(super) fn try_change_password(
        &self,
        state: &mut SessionState,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match action {
            FormAction::Cancel => self.enter_options(state, env),
            FormAction::Submit => {
                let (Some(old), Some(new), Some(confirm)) = (
                    form.get(fields::OLD_PASSWORD),
                    form.get(fields::NEW_PASSWORD),
                    form.get(fields::CONFIRM_PASSWORD),
                ) else {
                    state.message = Some(Message::error(MessageKey::PasswordMismatch));
                    return smallvec![Effect::None];
                };
                if new != confirm {
                    state.message = Some(Message::error(MessageKey::PasswordMismatch));
                    return smallvec![Effect::None];
                }

                let store = env.registrations.clone();
                let upn = state.upn.clone();
                let (old, new) = (old.to_string(), new.to_string());
                smallvec![Effect::future(async move {
                    let success = match store.change_password(&upn, &old, &new).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(
                                event_id = event_ids::REGISTRATION_SAVE_FAILED,
                                upn = %upn,
                                error = %e,
                                "Password change refused"
                            );
                            false
                        },
                    };
                    Some(SessionAction::PasswordChanged { success })
                })]
            },
            other => not_allowed(state, other),
        }
    }

    pub(super) fn on_password_changed(
        &self,
        state: &mut SessionState,
        success: bool,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if !success {
            state.message = Some(Message::error(MessageKey::PasswordChangeFailed));
            return smallvec![Effect::None];
        }
        let effects = self.enter_options(state, env);
        state.message = Some(Message::info(MessageKey::PasswordChanged));
        effects
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::SessionAction;
    use crate::config::{AdapterConfig, UserFeatures};
    use crate::constants::fields;
    use crate::environment::AdapterEnvironment;
    use crate::mocks::{MockMailProvider, MockProviderHub, MockRegistrationStore, MockReplayGuard};
    use crate::reducers::SessionReducer;
    use crate::state::{MessageKey, PreferredMethod, ProofData, Registration, SessionState, UiMode};
    use farm_mfa_core::environment::Clock;
    use farm_mfa_testing::{ReducerTest, assertions, test_clock};
    use std::sync::Arc;

    type Env = AdapterEnvironment<MockProviderHub, MockRegistrationStore, MockMailProvider, MockReplayGuard>;

    fn env(config: AdapterConfig) -> Env {
        AdapterEnvironment::new(
            MockProviderHub::new(),
            MockRegistrationStore::new(),
            MockMailProvider::new(),
            MockReplayGuard::new(),
            Arc::new(config),
            Arc::new(test_clock()),
        )
    }

    fn on(mode: UiMode) -> SessionState {
        let mut state = SessionState::new("dave@contoso.com", "10.0.0.4".parse().unwrap(), test_clock().now());
        state.apply_registration(&Registration::new("dave@contoso.com").with_method(PreferredMethod::Code));
        state.selected_method = PreferredMethod::Code;
        state.go_to(mode);
        state
    }

    fn submit(form: ProofData) -> SessionAction {
        SessionAction::Submit { form }
    }

    #[test]
    fn password_change_needs_permission() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(AdapterConfig::default()))
            .given_state(on(UiMode::SelectOptions))
            .when_action(submit(ProofData::new().with(fields::ACTION, "changepassword")))
            .then_state(|state| {
                assert_eq!(state.ui_mode, UiMode::SelectOptions);
                assert_eq!(state.message.map(|m| m.key), Some(MessageKey::NotAllowed));
            })
            .run();
    }

    #[test]
    fn password_confirmation_must_match() {
        let features = UserFeatures {
            allow_change_password: true,
            ..UserFeatures::default()
        };
        ReducerTest::new(SessionReducer::new())
            .with_env(env(AdapterConfig::default().with_features(features)))
            .given_state(on(UiMode::ChangePassword))
            .when_action(submit(
                ProofData::new()
                    .with(fields::OLD_PASSWORD, "old")
                    .with(fields::NEW_PASSWORD, "new-1")
                    .with(fields::CONFIRM_PASSWORD, "new-2"),
            ))
            .then_state(|state| {
                assert_eq!(state.ui_mode, UiMode::ChangePassword);
                assert_eq!(state.message.map(|m| m.key), Some(MessageKey::PasswordMismatch));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn chosen_method_is_requested() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(AdapterConfig::default().with_allow_choose(true)))
            .given_state(on(UiMode::ChooseMethod))
            .when_action(submit(ProofData::new().with(fields::METHOD, "email")))
            .then_state(|state| {
                assert_eq!(state.override_method, Some(PreferredMethod::Email));
                assert_eq!(state.selected_method, PreferredMethod::Email);
                assert_eq!(state.ui_mode, UiMode::SendAuthRequest);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn qr_code_returns_to_options() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env(AdapterConfig::default()))
            .given_state(on(UiMode::ShowQrCode))
            .when_action(submit(ProofData::new()))
            .then_state(|state| assert_eq!(state.ui_mode, UiMode::SelectOptions))
            .run();
    }
}
