//! The session reducer.
//!
//! One handler per [`UiMode`]. `Submit` is dispatched on the current mode;
//! every other action is either a host command or the result of an effect
//! the previous handler described.
//!
//! Handlers are grouped by concern:
//!
//! - `selection`: initial mode, provider selection, code requests
//! - `identification`: code and PIN verification, replay check, completion
//! - `locking`: the locking resolution, bypass and the definitive error
//! - `onboarding`: registration, invitation, administrative and key requests
//! - `options`: account options, method choice, password change, QR code
//! - `enrollment`: the generic enrollment wizard

mod enrollment;
mod identification;
mod locking;
mod onboarding;
mod options;
mod selection;

use crate::actions::SessionAction;
use crate::constants::event_ids;
use crate::environment::AdapterEnvironment;
use crate::providers::{AuthenticationProvider, MailProvider, RegistrationStore, ReplayGuard};
use crate::state::{Claim, Fault, FormAction, Message, MessageKey, PreferredMethod, ProofData, SessionState, UiMode};
use farm_mfa_core::reducer::{Effects, Reducer};
use farm_mfa_core::{effect::Effect, smallvec};
use farm_mfa_runtime::metrics::AdapterMetrics;
use std::marker::PhantomData;

pub use enrollment::{is_valid_email, is_valid_phone};

type SessionEffects = Effects<SessionAction>;

/// The authentication state machine.
///
/// Stateless; every decision is taken from the [`SessionState`] and the
/// injected [`AdapterEnvironment`].
pub struct SessionReducer<P, R, M, G> {
    _collaborators: PhantomData<fn() -> (P, R, M, G)>,
}

impl<P, R, M, G> SessionReducer<P, R, M, G> {
    /// Create a new session reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _collaborators: PhantomData,
        }
    }
}

impl<P, R, M, G> Default for SessionReducer<P, R, M, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, R, M, G> Clone for SessionReducer<P, R, M, G> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P, R, M, G> std::fmt::Debug for SessionReducer<P, R, M, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReducer").finish()
    }
}

impl<P, R, M, G> Reducer for SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    type State = SessionState;
    type Action = SessionAction;
    type Environment = AdapterEnvironment<P, R, M, G>;

    fn reduce(
        &self,
        state: &mut SessionState,
        action: SessionAction,
        env: &Self::Environment,
    ) -> SessionEffects {
        match action {
            // ═══════════════════════════════════════════════════════════
            // Host commands
            // ═══════════════════════════════════════════════════════════
            SessionAction::Initialize => self.initialize(state, env),
            SessionAction::Begin { options_requested } => self.begin(state, options_requested, env),
            SessionAction::Submit { form } => self.submit(state, &form, env),

            // ═══════════════════════════════════════════════════════════
            // Effect results
            // ═══════════════════════════════════════════════════════════
            SessionAction::RegistrationLoaded { registration } => {
                self.on_registration_loaded(state, registration.as_ref(), env)
            },
            SessionAction::RegistrationLoadFailed { reason } => {
                tracing::error!(
                    event_id = event_ids::REGISTRATION_LOAD_FAILED,
                    upn = %state.upn,
                    error = %reason,
                    "Registration could not be loaded"
                );
                state.output.fault = Some(Fault::Internal(reason));
                smallvec![Effect::None]
            },
            SessionAction::CodeRequested { response } => self.on_code_requested(state, response, env),
            SessionAction::TwoWayVerified { response } => self.on_two_way_verified(state, response, env),
            SessionAction::CodeVerified { response, code, pin } => {
                self.on_code_verified(state, response, code, pin.as_deref(), env)
            },
            SessionAction::ReplayChecked { outcome } => self.on_replay_checked(state, outcome, env),
            SessionAction::NotificationDelivered { delivered } => {
                if !delivered {
                    // Allow a later wizard in this session to try again
                    state.notification_sent = false;
                }
                smallvec![Effect::None]
            },
            SessionAction::EnrollmentCodeSent { response } => self.on_enrollment_code_sent(state, response, env),
            SessionAction::EnrollmentVerified { response } => self.on_enrollment_verified(state, response, env),
            SessionAction::RegistrationSaved { registration } => {
                self.on_registration_saved(state, registration, env)
            },
            SessionAction::RegistrationFailed { reason } => {
                tracing::error!(
                    event_id = event_ids::REGISTRATION_SAVE_FAILED,
                    upn = %state.upn,
                    mode = ?state.ui_mode,
                    error = %reason,
                    "Registration could not be saved"
                );
                state.message = Some(Message::error(MessageKey::RegistrationFailed));
                smallvec![Effect::None]
            },
            SessionAction::AdministrativeRequestSent { delivered } => {
                self.on_administrative_request_sent(state, delivered, env)
            },
            SessionAction::KeyReissued { registration, mailed } => {
                self.on_key_reissued(state, registration.as_ref(), mailed)
            },
            SessionAction::PasswordChanged { success } => self.on_password_changed(state, success, env),
        }
    }
}

impl<P, R, M, G> SessionReducer<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    /// `TryEndAuthentication`: one handler per mode, no fallthrough.
    fn submit(&self, state: &mut SessionState, form: &ProofData, env: &AdapterEnvironment<P, R, M, G>) -> SessionEffects {
        let Some(action) = form.action() else {
            return state_error(state, "unrecognised form action");
        };

        let mode = state.ui_mode;
        match mode {
            UiMode::PreSet => state_error(state, "no page has been presented yet"),
            UiMode::Identification => self.try_identification(state, action, form, env),
            UiMode::Registration => self.try_registration(state, action, form, env),
            UiMode::Invitation => self.try_invitation(state, action, env),
            UiMode::SelectOptions => self.try_select_options(state, action, form, env),
            UiMode::ChooseMethod => self.try_choose_method(state, action, form, env),
            UiMode::ChangePassword => self.try_change_password(state, action, form, env),
            UiMode::Bypass => try_bypass(state),
            UiMode::Locking => self.try_locking(state, env),
            UiMode::ShowQrCode => self.enter_options(state, env),
            UiMode::SendAuthRequest => self.request_code(state, env),
            UiMode::SendAdministrativeRequest => self.send_administrative_request(state, env),
            UiMode::SendKeyRequest => self.send_key_request(state, env),
            UiMode::EnrollOtp
            | UiMode::EnrollOtpAndSave
            | UiMode::EnrollOtpForce
            | UiMode::EnrollEmail
            | UiMode::EnrollEmailAndSave
            | UiMode::EnrollEmailForce
            | UiMode::EnrollPhone
            | UiMode::EnrollPhoneAndSave
            | UiMode::EnrollPhoneForce
            | UiMode::EnrollBiometrics
            | UiMode::EnrollBiometricsAndSave
            | UiMode::EnrollBiometricsForce
            | UiMode::EnrollPin
            | UiMode::EnrollPinAndSave
            | UiMode::EnrollPinForce => self.try_enrollment(state, mode, action, form, env),
            UiMode::DefinitiveError => definitive_error(state),
        }
    }

    /// Count a failed attempt; lock out once the budget is spent.
    ///
    /// Returns `true` when the session was locked out.
    fn register_failure(
        &self,
        state: &mut SessionState,
        key: MessageKey,
        env: &AdapterEnvironment<P, R, M, G>,
    ) -> bool {
        state.current_retries = state.current_retries.saturating_add(1);
        if state.current_retries >= env.config.max_retries {
            lock_out(state, MessageKey::TooManyRetries);
            return true;
        }
        tracing::info!(
            upn = %state.upn,
            retries = state.current_retries,
            reason = ?key,
            "Attempt failed"
        );
        state.message = Some(Message::error(key));
        false
    }
}

/// Send the session to `Locking` with the definitive error as target.
fn refuse(state: &mut SessionState, message: Message) {
    state.message = Some(message);
    state.target_mode = Some(UiMode::DefinitiveError);
    state.go_to(UiMode::Locking);
}

/// [`refuse`] after the retry budget or the delivery window ran out.
fn lock_out(state: &mut SessionState, key: MessageKey) {
    tracing::warn!(
        event_id = event_ids::LOCKOUT,
        upn = %state.upn,
        retries = state.current_retries,
        reason = ?key,
        "Session locked out"
    );
    AdapterMetrics::record_lockout();
    refuse(state, Message::error(key));
}

/// Hand the claims to the host; the session is over.
fn complete(state: &mut SessionState, method: PreferredMethod, claims: Vec<Claim>) -> SessionEffects {
    tracing::info!(upn = %state.upn, %method, retries = state.current_retries, "Authentication completed");
    AdapterMetrics::record_completed(method.as_str());
    state.pending_claims.clear();
    state.output.claims = Some(claims);
    smallvec![Effect::None]
}

fn try_bypass(state: &mut SessionState) -> SessionEffects {
    if state.pending_claims.is_empty() {
        return complete(state, PreferredMethod::None, vec![Claim::authentication_method(PreferredMethod::None)]);
    }
    let claims = std::mem::take(&mut state.pending_claims);
    let method = state.selected_method;
    complete(state, method, claims)
}

fn definitive_error(state: &mut SessionState) -> SessionEffects {
    let key = state.message.map_or(MessageKey::TooManyRetries, |message| message.key);
    tracing::error!(
        event_id = event_ids::DEFINITIVE_ERROR,
        upn = %state.upn,
        reason = ?key,
        "Authentication refused"
    );
    state.go_to(UiMode::DefinitiveError);
    state.output.fault = Some(Fault::Definitive(key));
    smallvec![Effect::None]
}

/// The request does not fit the session.
fn state_error(state: &mut SessionState, detail: &str) -> SessionEffects {
    tracing::error!(
        event_id = event_ids::STATE_ERROR,
        upn = %state.upn,
        mode = ?state.ui_mode,
        detail,
        "Request does not match session state"
    );
    state.output.fault = Some(Fault::Internal(format!("{detail} (mode {:?})", state.ui_mode)));
    smallvec![Effect::None]
}

/// Message shown when a page receives an action it does not offer.
fn not_allowed(state: &mut SessionState, action: FormAction) -> SessionEffects {
    tracing::debug!(upn = %state.upn, mode = ?state.ui_mode, ?action, "Action not offered on this page");
    state.message = Some(Message::error(MessageKey::NotAllowed));
    smallvec![Effect::None]
}
