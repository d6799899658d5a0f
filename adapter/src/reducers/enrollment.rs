//! The enrollment wizard.
//!
//! One five-step machine (`Intro`, `Configure`, `Verify`, `Confirm`, `Done`)
//! serves every `Enroll*` mode. The [`EnrollmentKind`] decides what
//! `Configure` and `Verify` check; the [`EnrollmentPolicy`] decides where
//! `Cancel` and `Done` lead:
//!
//! | Policy     | Cancel              | Done                                   |
//! |------------|---------------------|----------------------------------------|
//! | `Standard` | `SelectOptions`     | `SelectOptions`                        |
//! | `AndSave`  | `Registration`      | complete with the enrolled method      |
//! | `Force`    | `CancelNotAllowed`  | complete with the identification claim |
//!
//! The working registration is only persisted by `Confirm`, except for the
//! OTP key which the store must generate during `Configure`.

use super::{SessionEffects, SessionReducer, complete, not_allowed, state_error};
use crate::actions::{ResponseKind, SessionAction};
use crate::constants::{event_ids, fields};
use crate::environment::AdapterEnvironment;
use crate::providers::{AuthenticationProvider, MailProvider, ProviderContext, RegistrationStore, ReplayGuard, settle};
use crate::state::{
    Claim, EnrollmentKind, EnrollmentPolicy, FormAction, Message, MessageKey, ProofData, Registration, SessionState,
    UiMode, WizardStep,
};
use farm_mfa_core::{effect::Effect, smallvec};

/// Loose e-mail check: one `@`, a dotted domain, no whitespace.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// Phone number: optional leading `+`, then 6 to 15 digits with optional
/// spaces and dashes.
#[must_use]
pub fn is_valid_phone(value: &str) -> bool {
    let number = value.strip_prefix('+').unwrap_or(value);
    let digits = number.chars().filter(char::is_ascii_digit).count();
    number.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') && (6..=15).contains(&digits)
}

fn is_valid_pin(value: &str, length: usize) -> bool {
    value.len() == length && value.chars().all(|c| c.is_ascii_digit())
}

/// The working registration, seeded from the session when absent.
fn working(state: &mut SessionState) -> &mut Registration {
    let seed = state.registration();
    state.working_registration.get_or_insert(seed)
}

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    /// Enter the wizard for `kind` at `Intro`.
    ///
    /// The first wizard of a session mails a notice to the user.
    pub(super) fn enter_wizard(
        &self,
        state: &mut SessionState,
        kind: EnrollmentKind,
        policy: EnrollmentPolicy,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        tracing::info!(upn = %state.upn, kind = kind.as_str(), ?policy, "Entering enrollment");
        state.go_to(UiMode::enroll(kind, policy));
        state.wizard_step = WizardStep::Intro;
        let to = working(state).mail_address.clone().or_else(|| state.mail_address.clone());

        let Some(to) = to.filter(|_| kind.sends_notification() && !state.notification_sent) else {
            return smallvec![Effect::None];
        };
        state.notification_sent = true;

        let mailer = env.mailer.clone();
        let upn = state.upn.clone();
        smallvec![Effect::future(async move {
            let delivered = match mailer.send_enrollment_notice(&to, &upn, kind).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        event_id = event_ids::MAIL_FAILED,
                        upn = %upn,
                        kind = kind.as_str(),
                        error = %e,
                        "Enrollment notice could not be sent"
                    );
                    false
                },
            };
            Some(SessionAction::NotificationDelivered { delivered })
        })]
    }

    pub(super) fn try_enrollment(
        &self,
        state: &mut SessionState,
        mode: UiMode,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let Some((kind, policy)) = mode.enrollment() else {
            return state_error(state, "not an enrollment page");
        };

        match action {
            FormAction::Cancel => return self.cancel_wizard(state, policy, env),
            FormAction::Submit => {},
            other => return not_allowed(state, other),
        }

        match state.wizard_step {
            WizardStep::Intro => {
                state.wizard_step = WizardStep::Configure;
                smallvec![Effect::None]
            },
            WizardStep::Configure => self.configure(state, kind, form, env),
            WizardStep::Verify => self.verify(state, kind, form, env),
            WizardStep::Confirm => {
                let registration = working(state).clone();
                smallvec![self.save_registration(registration, false, env)]
            },
            WizardStep::Done => self.finish_wizard(state, kind, policy, env),
        }
    }

    fn cancel_wizard(
        &self,
        state: &mut SessionState,
        policy: EnrollmentPolicy,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match policy {
            EnrollmentPolicy::Standard => self.enter_options(state, env),
            EnrollmentPolicy::AndSave => {
                state.offered_methods.clone_from(&env.config.enabled_methods);
                state.go_to(UiMode::Registration);
                smallvec![Effect::None]
            },
            EnrollmentPolicy::Force => {
                state.message = Some(Message::error(MessageKey::CancelNotAllowed));
                smallvec![Effect::None]
            },
        }
    }

    fn configure(
        &self,
        state: &mut SessionState,
        kind: EnrollmentKind,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match kind {
            EnrollmentKind::Otp => {
                let registration = working(state).clone();
                smallvec![self.save_registration(registration, true, env)]
            },
            EnrollmentKind::Email => {
                let mail = form
                    .get(fields::EMAIL)
                    .map(str::to_string)
                    .or_else(|| working(state).mail_address.clone());
                let Some(mail) = mail.filter(|mail| is_valid_email(mail)) else {
                    state.message = Some(Message::error(MessageKey::InvalidEmail));
                    return smallvec![Effect::None];
                };
                working(state).mail_address = Some(mail);
                self.send_enrollment_code(state, kind, env)
            },
            EnrollmentKind::Phone => {
                let phone = form
                    .get(fields::PHONE)
                    .map(str::to_string)
                    .or_else(|| working(state).phone_number.clone());
                let Some(phone) = phone.filter(|phone| is_valid_phone(phone)) else {
                    state.message = Some(Message::error(MessageKey::InvalidPhone));
                    return smallvec![Effect::None];
                };
                working(state).phone_number = Some(phone);
                self.send_enrollment_code(state, kind, env)
            },
            EnrollmentKind::Pin => {
                let Some(pin) = form.get(fields::PIN).filter(|pin| is_valid_pin(pin, env.config.pin_length)) else {
                    state.message = Some(Message::error(MessageKey::InvalidPinFormat));
                    return smallvec![Effect::None];
                };
                working(state).pin = Some(pin.to_string());
                state.wizard_step = WizardStep::Verify;
                smallvec![Effect::None]
            },
            EnrollmentKind::Biometrics => self.send_enrollment_code(state, kind, env),
        }
    }

    /// Ask the provider to prove the new channel (or register the credential).
    fn send_enrollment_code(
        &self,
        state: &mut SessionState,
        kind: EnrollmentKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let method = kind.method();
        let registration = working(state).clone();
        let context = ProviderContext::from_registration(state, &registration, method);
        let providers = env.providers.clone();
        smallvec![Effect::future(async move {
            let result = if kind == EnrollmentKind::Biometrics {
                providers.enroll(method, &context).await
            } else {
                providers.post_authentication_request(method, &context).await
            };
            Some(SessionAction::EnrollmentCodeSent {
                response: settle(&context.upn, method, result),
            })
        })]
    }

    fn verify(
        &self,
        state: &mut SessionState,
        kind: EnrollmentKind,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if kind == EnrollmentKind::Pin {
            let expected = working(state).pin.clone().unwrap_or_default();
            let confirmed = form
                .get(fields::PIN)
                .is_some_and(|pin| constant_time_eq::constant_time_eq(pin.as_bytes(), expected.as_bytes()));
            if confirmed {
                state.wizard_step = WizardStep::Confirm;
            } else {
                self.register_failure(state, MessageKey::PinMismatch, env);
            }
            return smallvec![Effect::None];
        }

        let Some(code) = form.get(fields::CODE).map(str::to_string) else {
            return state_error(state, "enrollment verification posted without a code");
        };
        let method = kind.method();
        let registration = working(state).clone();
        let context = ProviderContext::from_registration(state, &registration, method);
        let providers = env.providers.clone();
        smallvec![Effect::future(async move {
            let result = providers.set_authentication_result(method, &context, &code).await;
            Some(SessionAction::EnrollmentVerified {
                response: settle(&context.upn, method, result),
            })
        })]
    }

    fn finish_wizard(
        &self,
        state: &mut SessionState,
        kind: EnrollmentKind,
        policy: EnrollmentPolicy,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match policy {
            EnrollmentPolicy::Standard => self.enter_options(state, env),
            EnrollmentPolicy::AndSave => {
                let method = kind.method();
                state.selected_method = method;
                complete(state, method, vec![Claim::authentication_method(method)])
            },
            EnrollmentPolicy::Force => {
                let method = state.selected_method;
                let mut claims = std::mem::take(&mut state.pending_claims);
                if claims.is_empty() {
                    claims.push(Claim::authentication_method(method));
                }
                complete(state, method, claims)
            },
        }
    }

    /// Persist a full registration; answers `RegistrationSaved` or `RegistrationFailed`.
    pub(super) fn save_registration(
        &self,
        registration: Registration,
        force_key_regen: bool,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> Effect<SessionAction> {
        let store = env.registrations.clone();
        Effect::future(async move {
            Some(match store.set_registration(registration, force_key_regen).await {
                Ok(registration) => SessionAction::RegistrationSaved { registration },
                Err(e) => SessionAction::RegistrationFailed { reason: e.to_string() },
            })
        })
    }

    pub(super) fn on_enrollment_code_sent(
        &self,
        state: &mut SessionState,
        response: ResponseKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let Some((kind, _)) = state.ui_mode.enrollment() else {
            return state_error(state, "enrollment code outside of a wizard");
        };
        match response {
            ResponseKind::Success if kind == EnrollmentKind::Biometrics => {
                state.wizard_step = WizardStep::Confirm;
            },
            ResponseKind::Success => {
                state.wizard_step = WizardStep::Verify;
                state.message = Some(Message::info(MessageKey::CodeSent));
            },
            ResponseKind::Failure | ResponseKind::Error => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
            },
        }
        smallvec![Effect::None]
    }

    pub(super) fn on_enrollment_verified(
        &self,
        state: &mut SessionState,
        response: ResponseKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match response {
            ResponseKind::Success => state.wizard_step = WizardStep::Confirm,
            ResponseKind::Failure => {
                self.register_failure(state, MessageKey::InvalidCode, env);
            },
            ResponseKind::Error => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
            },
        }
        smallvec![Effect::None]
    }

    pub(super) fn on_registration_saved(
        &self,
        state: &mut SessionState,
        registration: Registration,
        _env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let in_wizard = state.ui_mode.enrollment().is_some();
        match state.wizard_step {
            // OTP: the store generated the key, which the user must now prove
            WizardStep::Configure if in_wizard => {
                state.working_registration = Some(registration);
                state.key_changed = true;
                state.wizard_step = WizardStep::Verify;
            },
            WizardStep::Confirm if in_wizard => {
                tracing::info!(upn = %state.upn, mode = ?state.ui_mode, "Registration saved");
                state.apply_registration(&registration);
                state.working_registration = None;
                state.message = Some(Message::info(MessageKey::RegistrationSaved));
                state.wizard_step = WizardStep::Done;
            },
            _ => {
                state.apply_registration(&registration);
                if state.ui_mode == UiMode::SelectOptions {
                    state.message = Some(Message::info(MessageKey::RegistrationSaved));
                }
            },
        }
        smallvec![Effect::None]
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, is_valid_phone};
    use crate::actions::{ResponseKind, SessionAction};
    use crate::config::AdapterConfig;
    use crate::constants::fields;
    use crate::environment::AdapterEnvironment;
    use crate::mocks::{MailSent, MockMailProvider, MockProviderHub, MockRegistrationStore, MockReplayGuard};
    use crate::reducers::SessionReducer;
    use crate::state::{
        EnrollmentKind, EnrollmentPolicy, MessageKey, PreferredMethod, ProofData, Registration, SessionState, UiMode,
        WizardStep,
    };
    use farm_mfa_core::environment::Clock;
    use farm_mfa_core::reducer::Reducer;
    use farm_mfa_testing::{ReducerTest, assertions, test_clock};
    use std::sync::Arc;

    type Env = AdapterEnvironment<MockProviderHub, MockRegistrationStore, MockMailProvider, MockReplayGuard>;

    fn env_with(mailer: MockMailProvider) -> Env {
        AdapterEnvironment::new(
            MockProviderHub::new(),
            MockRegistrationStore::new(),
            mailer,
            MockReplayGuard::new(),
            Arc::new(AdapterConfig::default()),
            Arc::new(test_clock()),
        )
    }

    fn wizard(kind: EnrollmentKind, policy: EnrollmentPolicy, step: WizardStep) -> SessionState {
        let mut state = SessionState::new("erin@contoso.com", "10.0.0.5".parse().unwrap(), test_clock().now());
        state.apply_registration(
            &Registration::new("erin@contoso.com")
                .with_method(PreferredMethod::Code)
                .with_mail("erin@contoso.com"),
        );
        state.selected_method = PreferredMethod::Code;
        state.go_to(UiMode::enroll(kind, policy));
        state.wizard_step = step;
        state
    }

    fn submit(form: ProofData) -> SessionAction {
        SessionAction::Submit { form }
    }

    #[test]
    fn email_and_phone_formats() {
        assert!(is_valid_email("erin@contoso.com"));
        assert!(!is_valid_email("erin@contoso"));
        assert!(!is_valid_email("erin contoso@x.com"));
        assert!(!is_valid_email("@contoso.com"));
        assert!(is_valid_phone("+33 6 12-34-56-78"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("06 12 ab"));
    }

    #[tokio::test]
    async fn wizard_notice_is_sent_once_per_session() {
        let mailer = MockMailProvider::new();
        let env = env_with(mailer.clone());
        let reducer = SessionReducer::new();
        let mut state = wizard(EnrollmentKind::Email, EnrollmentPolicy::Standard, WizardStep::Intro);

        let first = reducer.enter_wizard(&mut state, EnrollmentKind::Email, EnrollmentPolicy::Standard, &env);
        assertions::assert_has_future_effect(&first);
        for effect in first {
            if let farm_mfa_core::effect::Effect::Future(fut) = effect {
                fut.await;
            }
        }
        assert!(state.notification_sent);

        let second = reducer.enter_wizard(&mut state, EnrollmentKind::Phone, EnrollmentPolicy::Standard, &env);
        assertions::assert_no_effects(&second);
        assert_eq!(
            mailer.sent(),
            vec![MailSent::EnrollmentNotice {
                to: "erin@contoso.com".into(),
                kind: EnrollmentKind::Email,
            }]
        );
    }

    #[test]
    fn pin_wizard_sends_no_notice() {
        let env = env_with(MockMailProvider::new());
        let mut state = wizard(EnrollmentKind::Pin, EnrollmentPolicy::Standard, WizardStep::Intro);

        let effects = SessionReducer::new().enter_wizard(&mut state, EnrollmentKind::Pin, EnrollmentPolicy::Standard, &env);

        assertions::assert_no_effects(&effects);
        assert!(!state.notification_sent);
    }

    #[test]
    fn forced_wizard_cannot_be_cancelled() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env_with(MockMailProvider::new()))
            .given_state(wizard(EnrollmentKind::Email, EnrollmentPolicy::Force, WizardStep::Configure))
            .when_action(submit(ProofData::new().with(fields::ACTION, "cancel")))
            .then_state(|state| {
                assert_eq!(state.ui_mode, UiMode::EnrollEmailForce);
                assert_eq!(state.message.map(|m| m.key), Some(MessageKey::CancelNotAllowed));
            })
            .run();
    }

    #[test]
    fn invalid_email_stays_on_configure() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env_with(MockMailProvider::new()))
            .given_state(wizard(EnrollmentKind::Email, EnrollmentPolicy::Standard, WizardStep::Configure))
            .when_action(submit(ProofData::new().with(fields::EMAIL, "not-an-address")))
            .then_state(|state| {
                assert_eq!(state.wizard_step, WizardStep::Configure);
                assert_eq!(state.message.map(|m| m.key), Some(MessageKey::InvalidEmail));
                assert_eq!(state.current_retries, 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn pin_configure_checks_length() {
        ReducerTest::new(SessionReducer::new())
            .with_env(env_with(MockMailProvider::new()))
            .given_state(wizard(EnrollmentKind::Pin, EnrollmentPolicy::Standard, WizardStep::Configure))
            .when_action(submit(ProofData::new().with(fields::PIN, "12a4")))
            .then_state(|state| assert_eq!(state.message.map(|m| m.key), Some(MessageKey::InvalidPinFormat)))
            .run();
    }

    #[test]
    fn pin_confirmation_mismatch_consumes_a_retry() {
        let env = env_with(MockMailProvider::new());
        let reducer = SessionReducer::new();
        let mut state = wizard(EnrollmentKind::Pin, EnrollmentPolicy::Standard, WizardStep::Configure);

        reducer.reduce(&mut state, submit(ProofData::new().with(fields::PIN, "2468")), &env);
        assert_eq!(state.wizard_step, WizardStep::Verify);

        reducer.reduce(&mut state, submit(ProofData::new().with(fields::PIN, "2469")), &env);
        assert_eq!(state.current_retries, 1);
        assert_eq!(state.message.map(|m| m.key), Some(MessageKey::PinMismatch));

        reducer.reduce(&mut state, submit(ProofData::new().with(fields::PIN, "2468")), &env);
        assert_eq!(state.wizard_step, WizardStep::Confirm);
    }

    #[test]
    fn confirmed_registration_moves_to_done() {
        let env = env_with(MockMailProvider::new());
        let mut state = wizard(EnrollmentKind::Pin, EnrollmentPolicy::Standard, WizardStep::Confirm);
        let saved = state.registration().with_pin("2468");

        SessionReducer::new().reduce(&mut state, SessionAction::RegistrationSaved { registration: saved }, &env);

        assert_eq!(state.wizard_step, WizardStep::Done);
        assert_eq!(state.pin_code.as_deref(), Some("2468"));
        assert!(state.working_registration.is_none());
    }

    #[test]
    fn failed_provider_verification_counts() {
        let env = env_with(MockMailProvider::new());
        let mut state = wizard(EnrollmentKind::Phone, EnrollmentPolicy::AndSave, WizardStep::Verify);

        SessionReducer::new().reduce(
            &mut state,
            SessionAction::EnrollmentVerified { response: ResponseKind::Failure },
            &env,
        );

        assert_eq!(state.current_retries, 1);
        assert_eq!(state.wizard_step, WizardStep::Verify);
        assert_eq!(state.message.map(|m| m.key), Some(MessageKey::InvalidCode));
    }
}
