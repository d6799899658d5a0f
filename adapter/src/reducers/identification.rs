//! Identification: code entry, PIN, replay check and completion.

use super::{SessionEffects, SessionReducer, complete, lock_out, not_allowed, state_error};
use crate::actions::{ResponseKind, SessionAction};
use crate::constants::{event_ids, fields};
use crate::environment::AdapterEnvironment;
use crate::providers::{
    AuthenticationProvider, MailProvider, ProviderContext, RegistrationStore, ReplayGuard, UiElement, settle,
};
use crate::state::{Claim, EnrollmentPolicy, FormAction, KeyStatus, Message, MessageKey, PreferredMethod, ProofData, SessionState, UiMode};
use chrono::Duration;
use farm_mfa_core::{effect::Effect, smallvec};
use farm_mfa_replay::{ReplayLevel, ReplayRecord};

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    pub(super) fn try_identification(
        &self,
        state: &mut SessionState,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match action {
            FormAction::Submit => self.verify_code(state, form, env),
            FormAction::RequestKey
                if state.selected_method == PreferredMethod::Code && state.mail_address.is_some() =>
            {
                state.go_to(UiMode::SendKeyRequest);
                self.send_key_request(state, env)
            },
            FormAction::ChooseMethod if env.config.allow_choose => {
                state.offered_methods = self.usable_methods(state, env);
                state.go_to(UiMode::ChooseMethod);
                smallvec![Effect::None]
            },
            FormAction::Cancel => {
                super::refuse(state, Message::error(MessageKey::AuthenticationCancelled));
                smallvec![Effect::None]
            },
            other => not_allowed(state, other),
        }
    }

    fn verify_code(&self, state: &mut SessionState, form: &ProofData, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let config = &env.config;
        if state.current_retries >= config.max_retries {
            lock_out(state, MessageKey::TooManyRetries);
            return smallvec![Effect::None];
        }
        let elapsed = env.clock.now() - state.logon_date;
        if elapsed > Duration::seconds(i64::from(config.delivery_window)) {
            lock_out(state, MessageKey::DeliveryWindowElapsed);
            return smallvec![Effect::None];
        }
        let Some(code) = form.get(fields::CODE).map(str::to_string) else {
            return state_error(state, "identification posted without a code");
        };
        let pin = form.get(fields::PIN).map(str::to_string);

        let providers = env.providers.clone();
        let method = state.selected_method;
        let context = ProviderContext::from_session(state, method);
        smallvec![Effect::future(async move {
            let result = providers.set_authentication_result(method, &context, &code).await;
            Some(SessionAction::CodeVerified {
                response: settle(&context.upn, method, result),
                code,
                pin,
            })
        })]
    }

    fn pin_required(&self, state: &SessionState, env: &AdapterEnvironment<P, R, M, G>) -> bool {
        env.config.pin_required
            && state.pin_code.is_some()
            && env
                .providers
                .is_ui_element_required(state.selected_method, UiElement::Pin)
    }

    pub(super) fn on_code_verified(
        &self,
        state: &mut SessionState,
        response: ResponseKind,
        code: String,
        pin: Option<&str>,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match response {
            ResponseKind::Success => {},
            ResponseKind::Failure => {
                self.register_failure(state, MessageKey::InvalidCode, env);
                return smallvec![Effect::None];
            },
            ResponseKind::Error => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
                return smallvec![Effect::None];
            },
        }

        if self.pin_required(state, env) {
            let expected = state.pin_code.as_deref().unwrap_or_default();
            let matches = pin.is_some_and(|pin| constant_time_eq::constant_time_eq(pin.as_bytes(), expected.as_bytes()));
            if !matches {
                self.register_failure(state, MessageKey::InvalidPin, env);
                return smallvec![Effect::None];
            }
        }

        let config = &env.config;
        if config.replay_level == ReplayLevel::Disabled {
            return self.complete_identification(state, env);
        }

        let record = ReplayRecord::new(
            state.upn.clone(),
            code,
            state.ip_address,
            state.logon_date,
            config.delivery_window,
            config.replay_level,
        );
        let replay = env.replay.clone();
        let upn = state.upn.clone();
        smallvec![Effect::future(async move {
            let outcome = match replay.check(record).await {
                Ok(true) => ResponseKind::Success,
                Ok(false) => ResponseKind::Failure,
                Err(e) => {
                    tracing::error!(
                        event_id = event_ids::REPLAY_UNAVAILABLE,
                        upn = %upn,
                        error = %e,
                        "Replay check failed"
                    );
                    ResponseKind::Error
                },
            };
            Some(SessionAction::ReplayChecked { outcome })
        })]
    }

    pub(super) fn on_replay_checked(
        &self,
        state: &mut SessionState,
        outcome: ResponseKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match outcome {
            ResponseKind::Success => self.complete_identification(state, env),
            ResponseKind::Failure => {
                tracing::error!(
                    event_id = event_ids::REPLAY_DETECTED,
                    upn = %state.upn,
                    ip = %state.ip_address,
                    "Replayed code submitted"
                );
                state.current_retries = env.config.max_retries;
                lock_out(state, MessageKey::ReplayDetected);
                smallvec![Effect::None]
            },
            ResponseKind::Error => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
                smallvec![Effect::None]
            },
        }
    }

    /// The code was accepted: force enrollment, show options or finish.
    fn complete_identification(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let claim = Claim::authentication_method(state.selected_method);
        let first_choice = state.first_choice_method;

        if first_choice != state.selected_method && first_choice.is_primary() {
            let context = ProviderContext::from_session(state, first_choice);
            if env.providers.requires_enrollment(first_choice, &context) {
                if let Some(kind) = first_choice.enrollment_kind() {
                    tracing::info!(upn = %state.upn, %first_choice, "Forcing enrollment of first choice");
                    state.pending_claims = vec![claim];
                    return self.enter_wizard(state, kind, EnrollmentPolicy::Force, env);
                }
            }
        }

        if state.key_status == KeyStatus::Generated {
            state.key_status = KeyStatus::Set;
        }

        if state.show_options {
            state.pending_claims = vec![claim];
            return self.enter_options(state, env);
        }

        let method = state.selected_method;
        complete(state, method, vec![claim])
    }
}
