//! Initial mode, provider selection and code requests.

use super::{SessionEffects, SessionReducer, refuse};
use crate::actions::{ResponseKind, SessionAction};
use crate::constants::OPTIONS_COOKIE;
use crate::environment::AdapterEnvironment;
use crate::providers::{
    AuthenticationProvider, MailProvider, ProviderContext, RegistrationStore, ReplayGuard, UiElement, settle,
};
use crate::state::{Claim, Cookie, Message, MessageKey, PreferredMethod, Registration, SessionState, UiMode};
use farm_mfa_core::{effect::Effect, smallvec};
use std::iter;

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    /// `IsAvailableForUser`: load the registration.
    pub(super) fn initialize(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let store = env.registrations.clone();
        let upn = state.upn.clone();
        smallvec![Effect::future(async move {
            Some(match store.get_registration(&upn).await {
                Ok(registration) => SessionAction::RegistrationLoaded { registration },
                Err(e) => SessionAction::RegistrationLoadFailed { reason: e.to_string() },
            })
        })]
    }

    /// Compute the initial mode from the registration and the feature flags.
    pub(super) fn on_registration_loaded(
        &self,
        state: &mut SessionState,
        registration: Option<&Registration>,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        state.target_mode = None;
        match registration {
            Some(registration) => {
                state.apply_registration(registration);
                if registration.enabled {
                    state.go_to(UiMode::PreSet);
                } else {
                    tracing::info!(upn = %state.upn, "Registration is disabled");
                    state.go_to(UiMode::Locking);
                }
            },
            None if env.config.features.self_registration() => {
                state.is_registered = false;
                state.working_registration = Some(Registration::new(state.upn.clone()));
                state.offered_methods = env.config.enabled_methods.clone();
                state.go_to(UiMode::Registration);
            },
            None => {
                state.is_registered = false;
                state.go_to(UiMode::Locking);
            },
        }
        smallvec![Effect::None]
    }

    /// `BeginAuthentication`.
    pub(super) fn begin(
        &self,
        state: &mut SessionState,
        options_requested: bool,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if options_requested && env.config.features.allow_manage_options {
            state.show_options = true;
            state.output.cookies.push(Cookie {
                name: OPTIONS_COOKIE.to_string(),
                value: "1".to_string(),
            });
        }

        match state.ui_mode {
            UiMode::PreSet => self.select_provider(state, env),
            UiMode::Locking => self.resolve_locking(state, env),
            _ => smallvec![Effect::None],
        }
    }

    /// Methods the user could authenticate with right now.
    pub(super) fn usable_methods(
        &self,
        state: &SessionState,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> Vec<PreferredMethod> {
        env.config
            .enabled_methods
            .iter()
            .copied()
            .filter(|method| self.is_usable(state, *method, env))
            .collect()
    }

    fn is_usable(&self, state: &SessionState, method: PreferredMethod, env: &AdapterEnvironment<P, R, M, G>) -> bool {
        let context = ProviderContext::from_session(state, method);
        method.is_primary()
            && env.config.is_method_enabled(method)
            && env.providers.is_available(method, &context)
            && !env.providers.requires_enrollment(method, &context)
    }

    /// Pick the channel for this attempt and request a code through it.
    pub(super) fn select_provider(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let config = &env.config;
        if state.preferred_method == PreferredMethod::Choose && state.override_method.is_none() && config.allow_choose {
            state.offered_methods = self.usable_methods(state, env);
            state.go_to(UiMode::ChooseMethod);
            return smallvec![Effect::None];
        }

        state.first_choice_method = if state.preferred_method.is_primary() {
            state.preferred_method
        } else {
            config.default_method
        };

        let mut candidates = state
            .override_method
            .into_iter()
            .chain(iter::once(state.first_choice_method))
            .chain(config.fallback_order.iter().copied());
        let selected = candidates.find(|method| self.is_usable(state, *method, env));

        let Some(method) = selected else {
            tracing::warn!(upn = %state.upn, first_choice = %state.first_choice_method, "No usable method");
            refuse(state, Message::error(MessageKey::NoUsableMethod));
            return smallvec![Effect::None];
        };

        if method != state.first_choice_method {
            tracing::info!(upn = %state.upn, first_choice = %state.first_choice_method, %method, "Falling back");
        }
        self.use_method(state, method, env);
        state.go_to(UiMode::SendAuthRequest);
        self.request_code(state, env)
    }

    /// Make `method` the channel of this attempt.
    pub(super) fn use_method(&self, state: &mut SessionState, method: PreferredMethod, env: &AdapterEnvironment<P, R, M, G>) {
        let capabilities = env.providers.capabilities(method);
        state.selected_method = method;
        state.is_remote = capabilities.is_remote;
        state.is_two_way = capabilities.is_two_way;
        state.account_management_url = if env.providers.is_ui_element_required(method, UiElement::AccountManagement) {
            env.providers
                .account_management_url(method, &ProviderContext::from_session(state, method))
        } else {
            None
        };
    }

    /// `SendAuthRequest`: trigger the selected provider.
    pub(super) fn request_code(&self, state: &mut SessionState, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let providers = env.providers.clone();
        let method = state.selected_method;
        let context = ProviderContext::from_session(state, method);
        smallvec![Effect::future(async move {
            let result = providers.post_authentication_request(method, &context).await;
            Some(SessionAction::CodeRequested {
                response: settle(&context.upn, method, result),
            })
        })]
    }

    pub(super) fn on_code_requested(
        &self,
        state: &mut SessionState,
        response: ResponseKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        if state.ui_mode != UiMode::SendAuthRequest {
            return super::state_error(state, "code request answered outside SendAuthRequest");
        }
        match (response, state.is_remote, state.is_two_way) {
            (ResponseKind::Success, false, _) => {
                state.go_to(UiMode::Identification);
                smallvec![Effect::None]
            },
            (ResponseKind::Success, true, false) => {
                state.message = Some(Message::info(MessageKey::CodeSent));
                state.go_to(UiMode::Identification);
                smallvec![Effect::None]
            },
            (ResponseKind::Success, true, true) => {
                let providers = env.providers.clone();
                let method = state.selected_method;
                let context = ProviderContext::from_session(state, method);
                smallvec![Effect::future(async move {
                    let result = providers.set_authentication_result(method, &context, "").await;
                    Some(SessionAction::TwoWayVerified {
                        response: settle(&context.upn, method, result),
                    })
                })]
            },
            (ResponseKind::Failure | ResponseKind::Error, ..) => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
                smallvec![Effect::None]
            },
        }
    }

    /// The two-way channel answered; no code is entered.
    pub(super) fn on_two_way_verified(
        &self,
        state: &mut SessionState,
        response: ResponseKind,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> SessionEffects {
        match response {
            ResponseKind::Success => {
                let claim = Claim::authentication_method(state.selected_method);
                state.pending_claims.push(claim);
                state.go_to(UiMode::Bypass);
            },
            ResponseKind::Failure => {
                self.register_failure(state, MessageKey::InvalidCode, env);
            },
            ResponseKind::Error => {
                self.register_failure(state, MessageKey::ProviderUnavailable, env);
            },
        }
        smallvec![Effect::None]
    }
}
