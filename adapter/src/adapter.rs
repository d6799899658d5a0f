//! Host entry points.
//!
//! [`AuthenticationAdapter`] is what the federation host calls. Each call
//! restores the session from the opaque [`HostContext`], runs the session
//! reducer to quiescence with a [`Driver`], raises any fault recorded by the
//! handlers and stores the session back.

use crate::actions::SessionAction;
use crate::config::AdapterConfig;
use crate::constants::{OPTIONS_COOKIE, OPTIONS_URL_MARKER, SESSION_CONTEXT_KEY, SUPPORTED_LOCALES, claims, event_ids};
use crate::environment::AdapterEnvironment;
use crate::error::{AdapterError, Result};
use crate::providers::{AuthenticationProvider, MailProvider, RegistrationStore, ReplayGuard};
use crate::reducers::SessionReducer;
use crate::state::{AuthOutcome, Fault, Presentation, ProofData, SessionState};
use farm_mfa_core::environment::Clock;
use farm_mfa_runtime::Driver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::Instrument;

/// Opaque per-attempt storage owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    values: HashMap<String, String>,
}

impl HostContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Store `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    fn load_session(&self) -> Result<SessionState> {
        let raw = self
            .get(SESSION_CONTEXT_KEY)
            .ok_or_else(|| AdapterError::Context("no session stored".into()))?;
        serde_json::from_str(raw).map_err(|e| AdapterError::Context(e.to_string()))
    }

    fn store_session(&mut self, state: &SessionState) -> Result<()> {
        let raw = serde_json::to_string(state).map_err(|e| AdapterError::Context(e.to_string()))?;
        self.insert(SESSION_CONTEXT_KEY, raw);
        Ok(())
    }
}

/// What the host knows about the HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest {
    /// Client address
    pub ip_address: IpAddr,
    /// Request URL
    pub url: String,
    /// Cookies sent by the browser
    pub cookies: HashMap<String, String>,
}

impl HostRequest {
    /// Request from `ip_address` for `url` without cookies.
    #[must_use]
    pub fn new(ip_address: IpAddr, url: impl Into<String>) -> Self {
        Self {
            ip_address,
            url: url.into(),
            cookies: HashMap::new(),
        }
    }

    /// Add a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Options were asked for through the URL marker or the cookie set earlier.
    fn options_requested(&self) -> bool {
        self.url.to_ascii_lowercase().contains(OPTIONS_URL_MARKER)
            || self.cookies.get(OPTIONS_COOKIE).is_some_and(|value| value == "1")
    }
}

/// Static description of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterMetadata {
    /// Claim types the adapter may issue
    pub claims: &'static [&'static str],
    /// Locales with translated pages
    pub locales: &'static [&'static str],
}

type SessionDriver<P, R, M, G> = Driver<SessionReducer<P, R, M, G>>;

/// The authentication adapter.
///
/// Collaborators are given at construction; the configuration arrives with
/// [`AuthenticationAdapter::on_pipeline_load`]. Every other call fails with
/// [`AdapterError::Configuration`] until then.
pub struct AuthenticationAdapter<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    providers: P,
    registrations: R,
    mailer: M,
    replay: G,
    clock: Arc<dyn Clock>,
    driver: Option<SessionDriver<P, R, M, G>>,
}

impl<P, R, M, G> AuthenticationAdapter<P, R, M, G>
where
    P: AuthenticationProvider + Clone + 'static,
    R: RegistrationStore + Clone + 'static,
    M: MailProvider + Clone + 'static,
    G: ReplayGuard + Clone + 'static,
{
    /// Create an unloaded adapter.
    pub fn new(providers: P, registrations: R, mailer: M, replay: G, clock: Arc<dyn Clock>) -> Self {
        Self {
            providers,
            registrations,
            mailer,
            replay,
            clock,
            driver: None,
        }
    }

    /// Claims and locales advertised to the host.
    #[must_use]
    pub const fn metadata() -> AdapterMetadata {
        AdapterMetadata {
            claims: &claims::ALL,
            locales: &SUPPORTED_LOCALES,
        }
    }

    /// Parse the configuration blob and get ready to serve.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the blob is malformed or
    /// fails validation; the previous configuration, if any, stays active.
    pub fn on_pipeline_load(&mut self, config_data: &str) -> Result<()> {
        let config = AdapterConfig::from_json(config_data).inspect_err(|e| {
            tracing::error!(
                event_id = event_ids::CONFIGURATION_INVALID,
                error = %e,
                "Adapter configuration rejected"
            );
        })?;
        tracing::info!(
            max_retries = config.max_retries,
            delivery_window = config.delivery_window,
            replay_level = ?config.replay_level,
            "Adapter configuration loaded"
        );

        let environment = AdapterEnvironment::new(
            self.providers.clone(),
            self.registrations.clone(),
            self.mailer.clone(),
            self.replay.clone(),
            Arc::new(config),
            Arc::clone(&self.clock),
        );
        self.driver = Some(Driver::new(SessionReducer::new(), environment));
        Ok(())
    }

    /// Drop the configuration.
    pub fn on_pipeline_unload(&mut self) {
        if self.driver.take().is_some() {
            tracing::info!("Adapter unloaded");
        }
    }

    /// Active configuration, once loaded.
    #[must_use]
    pub fn config(&self) -> Option<&AdapterConfig> {
        self.driver.as_ref().map(|driver| driver.environment().config.as_ref())
    }

    fn driver(&self) -> Result<&SessionDriver<P, R, M, G>> {
        self.driver
            .as_ref()
            .ok_or_else(|| AdapterError::Configuration("adapter is not loaded".into()))
    }

    async fn run(&self, state: &mut SessionState, action: SessionAction) -> Result<()> {
        self.driver()?
            .run(state, action)
            .await
            .map_err(|e| AdapterError::wrap(&state.upn, e))?;
        raise(state)
    }

    /// Start an attempt: load the registration and compute the first mode.
    ///
    /// Always `Ok(true)`; users who cannot authenticate are handled by the
    /// locking path.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Authentication`] when the registration
    /// cannot be read.
    #[tracing::instrument(skip_all, fields(upn = %upn))]
    pub async fn is_available_for_user(&self, upn: &str, request: &HostRequest, context: &mut HostContext) -> Result<bool> {
        let mut state = SessionState::new(upn, request.ip_address, self.clock.now());
        self.run(&mut state, SessionAction::Initialize).await?;
        context.store_session(&state).map_err(|e| AdapterError::wrap(upn, e))?;
        Ok(true)
    }

    /// Present the first page.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Authentication`] when the context holds no
    /// session for `upn` or a handler faults.
    #[tracing::instrument(skip_all, fields(upn = %upn))]
    pub async fn begin_authentication(
        &self,
        upn: &str,
        request: &HostRequest,
        context: &mut HostContext,
    ) -> Result<Presentation> {
        let mut state = context.load_session().map_err(|e| AdapterError::wrap(upn, e))?;
        if !state.upn.eq_ignore_ascii_case(upn) {
            return Err(AdapterError::wrap(upn, AdapterError::Context("session belongs to another user".into())));
        }

        state.begin_request();
        let options_requested = request.options_requested();
        self.run(&mut state, SessionAction::Begin { options_requested }).await?;

        context.store_session(&state).map_err(|e| AdapterError::wrap(upn, e))?;
        Ok(state.presentation(self.max_retries()))
    }

    /// Handle a posted page.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::DefinitiveError`] when the locking path ends
    /// the attempt and [`AdapterError::Authentication`] for any other fault.
    pub async fn try_end_authentication(
        &self,
        context: &mut HostContext,
        proof: &ProofData,
        request: &HostRequest,
    ) -> Result<AuthOutcome> {
        let mut state = context.load_session().map_err(|e| AdapterError::wrap("<unknown>", e))?;
        let span = tracing::info_span!("try_end_authentication", upn = %state.upn, mode = ?state.ui_mode);

        // Replay records carry the address the proof was posted from
        state.ip_address = request.ip_address;
        state.begin_request();
        let outcome = self
            .run(&mut state, SessionAction::Submit { form: proof.clone() })
            .instrument(span)
            .await;
        context.store_session(&state).map_err(|e| AdapterError::wrap(&state.upn, e))?;
        outcome?;

        Ok(match state.output.claims.take() {
            Some(claims) => AuthOutcome {
                presentation: None,
                claims,
            },
            None => AuthOutcome {
                presentation: Some(state.presentation(self.max_retries())),
                claims: Vec::new(),
            },
        })
    }

    fn max_retries(&self) -> u32 {
        self.config().map_or(0, |config| config.max_retries)
    }
}

/// Turn the fault recorded by a handler into the host-visible error.
fn raise(state: &SessionState) -> Result<()> {
    match &state.output.fault {
        None => Ok(()),
        Some(Fault::Definitive(key)) => Err(AdapterError::DefinitiveError {
            upn: state.upn.clone(),
            reason: format!("{key:?}"),
        }),
        Some(Fault::Internal(detail)) => Err(AdapterError::wrap(&state.upn, detail)),
    }
}
