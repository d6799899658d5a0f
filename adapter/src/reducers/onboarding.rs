//! Registration, invitation and the administrative and key requests.

use super::{SessionEffects, SessionReducer, not_allowed, refuse};
use crate::actions::SessionAction;
use crate::constants::{event_ids, fields};
use crate::environment::AdapterEnvironment;
use crate::providers::{AuthenticationProvider, MailProvider, RegistrationStore, ReplayGuard};
use crate::state::{EnrollmentPolicy, FormAction, Message, MessageKey, PreferredMethod, ProofData, Registration, SessionState, UiMode};
use farm_mfa_core::{effect::Effect, smallvec};

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    /// Self-registration: pick a method, then enroll it.
    pub(super) fn try_registration(
        &self,
        state: &mut SessionState,
        action: FormAction,
        form: &ProofData,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match action {
            FormAction::Cancel => {
                state.working_registration = None;
                state.go_to(UiMode::Locking);
                self.resolve_locking(state, env)
            },
            FormAction::Submit => {
                let method = form
                    .get(fields::METHOD)
                    .and_then(PreferredMethod::parse)
                    .filter(|method| method.is_primary() && env.config.is_method_enabled(*method));
                let Some((method, kind)) = method.and_then(|method| method.enrollment_kind().map(|kind| (method, kind)))
                else {
                    state.message = Some(Message::error(MessageKey::InvalidMethod));
                    return smallvec![Effect::None];
                };

                let mut working = state
                    .working_registration
                    .take()
                    .unwrap_or_else(|| Registration::new(state.upn.clone()));
                working.preferred_method = method;
                if let Some(mail) = form.get(fields::EMAIL) {
                    working.mail_address = Some(mail.to_string());
                }
                if let Some(phone) = form.get(fields::PHONE) {
                    working.phone_number = Some(phone.to_string());
                }
                state.working_registration = Some(working);
                self.enter_wizard(state, kind, EnrollmentPolicy::AndSave, env)
            },
            other => not_allowed(state, other),
        }
    }

    /// Invitation page: ask the administrators or give up.
    pub(super) fn try_invitation(
        &self,
        state: &mut SessionState,
        action: FormAction,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if action == FormAction::Request {
            state.go_to(UiMode::SendAdministrativeRequest);
            return self.send_administrative_request(state, env);
        }

        let features = &env.config.features;
        let bypass = if state.is_registered {
            features.bypass_disabled
        } else {
            features.bypass_unregistered
        };
        if bypass {
            state.go_to(UiMode::Bypass);
        } else {
            refuse(state, Message::error(MessageKey::AuthenticationCancelled));
        }
        smallvec![Effect::None]
    }

    pub(super) fn send_administrative_request(
        &self,
        state: &mut SessionState,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        let mailer = env.mailer.clone();
        let administrators = env.config.administrators.clone();
        let upn = state.upn.clone();
        smallvec![Effect::future(async move {
            let delivered = match mailer.send_administrative_request(&administrators, &upn).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        event_id = event_ids::MAIL_FAILED,
                        upn = %upn,
                        error = %e,
                        "Administrative request could not be sent"
                    );
                    false
                },
            };
            Some(SessionAction::AdministrativeRequestSent { delivered })
        })]
    }

    pub(super) fn on_administrative_request_sent(
        &self,
        state: &mut SessionState,
        delivered: bool,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if !delivered {
            refuse(state, Message::error(MessageKey::MailFailed));
        } else if !state.is_registered && env.config.features.allow_unregistered {
            state.message = Some(Message::info(MessageKey::RequestSent));
            state.go_to(UiMode::Bypass);
        } else {
            refuse(state, Message::info(MessageKey::RequestSent));
        }
        smallvec![Effect::None]
    }

    /// Issue a new authenticator key and mail it.
    pub(super) fn send_key_request(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let Some(to) = state.mail_address.clone() else {
            state.message = Some(Message::error(MessageKey::MailFailed));
            state.go_to(UiMode::Identification);
            return smallvec![Effect::None];
        };

        let store = env.registrations.clone();
        let mailer = env.mailer.clone();
        let registration = state.registration();
        smallvec![Effect::future(async move {
            let upn = registration.upn.clone();
            let registration = match store.set_registration(registration, true).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(
                        event_id = event_ids::REGISTRATION_SAVE_FAILED,
                        upn = %upn,
                        error = %e,
                        "Key could not be issued"
                    );
                    return Some(SessionAction::KeyReissued {
                        registration: None,
                        mailed: false,
                    });
                },
            };
            let mailed = match mailer.send_key(&to, &upn).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        event_id = event_ids::MAIL_FAILED,
                        upn = %upn,
                        error = %e,
                        "Key mail could not be sent"
                    );
                    false
                },
            };
            Some(SessionAction::KeyReissued {
                registration: Some(registration),
                mailed,
            })
        })]
    }

    pub(super) fn on_key_reissued(
        &self,
        state: &mut SessionState,
        registration: Option<&Registration>,
        mailed: bool,
    ) -> SessionEffects {
        if let Some(registration) = registration {
            state.apply_registration(registration);
            state.key_changed = true;
        }
        state.message = Some(if registration.is_some() && mailed {
            Message::info(MessageKey::KeySent)
        } else if registration.is_some() {
            Message::error(MessageKey::MailFailed)
        } else {
            Message::error(MessageKey::RegistrationFailed)
        });
        state.go_to(UiMode::Identification);
        smallvec![Effect::None]
    }
}
