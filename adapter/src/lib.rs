//! # Farm MFA Adapter
//!
//! Multi-factor authentication adapter for a federation server farm.
//!
//! The host drives one attempt through three calls on
//! [`AuthenticationAdapter`]: `is_available_for_user` computes the first
//! page, `begin_authentication` presents it and `try_end_authentication`
//! handles each posted page until claims are issued or the attempt ends on
//! the definitive error. Between calls the whole [`SessionState`] lives in
//! the host's opaque [`HostContext`].
//!
//! Every page is a [`UiMode`]; the [`SessionReducer`] has one handler per
//! mode. Handlers never call providers directly: they return effects that
//! the runtime driver executes and feeds back as [`SessionAction`]s.
//!
//! ## Example
//!
//! ```ignore
//! use farm_mfa_adapter::{AuthenticationAdapter, HostContext, HostRequest, ProofData};
//!
//! let mut adapter = AuthenticationAdapter::new(providers, store, mailer, replay, clock);
//! adapter.on_pipeline_load(config_json)?;
//!
//! let mut context = HostContext::new();
//! adapter.is_available_for_user(upn, &request, &mut context).await?;
//! let page = adapter.begin_authentication(upn, &request, &mut context).await?;
//! let outcome = adapter
//!     .try_end_authentication(&mut context, &ProofData::new().with("code", "123456"), &request)
//!     .await?;
//! assert!(outcome.is_complete());
//! ```

pub mod actions;
pub mod adapter;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod providers;
pub mod reducers;
pub mod state;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use actions::{ResponseKind, SessionAction};
pub use adapter::{AdapterMetadata, AuthenticationAdapter, HostContext, HostRequest};
pub use config::{AdapterConfig, MfaPolicy, RegistrationPolicy, UserFeatures};
pub use environment::AdapterEnvironment;
pub use error::{AdapterError, Result};
pub use providers::{
    AuthenticationProvider, Capabilities, FarmReplayGuard, MailProvider, PeerReplayGuard, ProviderContext,
    RegistrationStore, ReplayGuard, UiElement,
};
pub use reducers::{SessionReducer, is_valid_email, is_valid_phone};
pub use state::{
    AuthOutcome, Claim, Cookie, EnrollmentKind, EnrollmentPolicy, FormAction, KeyStatus, Message, MessageKey,
    PreferredMethod, Presentation, ProofData, Registration, SessionState, Severity, UiMode, WizardStep,
};
