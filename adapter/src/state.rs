//! Session state types.
//!
//! A [`SessionState`] lives for one authentication attempt. Between requests
//! it is serialized into the host's opaque context; the per-request output
//! (claims, cookies, faults) is never serialized.

use crate::constants::{AUTHENTICATION_METHOD_CLAIM, claims, fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

// ═══════════════════════════════════════════════════════════════════════
// Methods and modes
// ═══════════════════════════════════════════════════════════════════════

/// Second-factor method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreferredMethod {
    /// Let the user pick at sign-in.
    #[default]
    Choose,
    /// One-time code from an authenticator app.
    Code,
    /// One-time code sent by e-mail.
    Email,
    /// SMS or voice gateway.
    External,
    /// Push notification to a phone app.
    Azure,
    /// Platform biometrics.
    Biometrics,
    /// Companion PIN; never a primary method.
    Pin,
    /// No second factor (bypass).
    None,
}

impl PreferredMethod {
    /// Methods that can authenticate a user on their own.
    pub const PRIMARY: [Self; 5] = [Self::Code, Self::Email, Self::External, Self::Azure, Self::Biometrics];

    /// Stable lowercase name, used in forms, logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Choose => "choose",
            Self::Code => "code",
            Self::Email => "email",
            Self::External => "external",
            Self::Azure => "azure",
            Self::Biometrics => "biometrics",
            Self::Pin => "pin",
            Self::None => "none",
        }
    }

    /// Parse a method name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Choose,
            Self::Code,
            Self::Email,
            Self::External,
            Self::Azure,
            Self::Biometrics,
            Self::Pin,
            Self::None,
        ]
        .into_iter()
        .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Whether this method can be selected to authenticate.
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Code | Self::Email | Self::External | Self::Azure | Self::Biometrics)
    }

    /// Value of the authentication-method claim issued for this method.
    #[must_use]
    pub const fn claim_value(self) -> &'static str {
        match self {
            Self::Code => claims::CODE,
            Self::Email => claims::EMAIL,
            Self::External => claims::EXTERNAL,
            Self::Azure => claims::AZURE,
            Self::Biometrics => claims::BIOMETRICS,
            Self::Pin => claims::PIN,
            Self::Choose | Self::None => claims::NONE,
        }
    }

    /// Enrollment wizard that provisions this method.
    #[must_use]
    pub const fn enrollment_kind(self) -> Option<EnrollmentKind> {
        match self {
            Self::Code => Some(EnrollmentKind::Otp),
            Self::Email => Some(EnrollmentKind::Email),
            Self::External | Self::Azure => Some(EnrollmentKind::Phone),
            Self::Biometrics => Some(EnrollmentKind::Biometrics),
            Self::Pin => Some(EnrollmentKind::Pin),
            Self::Choose | Self::None => None,
        }
    }
}

impl std::fmt::Display for PreferredMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an enrollment wizard provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrollmentKind {
    /// Authenticator app key
    Otp,
    /// E-mail address
    Email,
    /// Phone number
    Phone,
    /// Biometric credential
    Biometrics,
    /// Companion PIN
    Pin,
}

impl EnrollmentKind {
    /// Every wizard kind.
    pub const ALL: [Self; 5] = [Self::Otp, Self::Email, Self::Phone, Self::Biometrics, Self::Pin];

    /// Method proven by this wizard's verification step.
    #[must_use]
    pub const fn method(self) -> PreferredMethod {
        match self {
            Self::Otp => PreferredMethod::Code,
            Self::Email => PreferredMethod::Email,
            Self::Phone => PreferredMethod::External,
            Self::Biometrics => PreferredMethod::Biometrics,
            Self::Pin => PreferredMethod::Pin,
        }
    }

    /// Whether entering the wizard sends a notification mail.
    #[must_use]
    pub const fn sends_notification(self) -> bool {
        !matches!(self, Self::Pin)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Otp => "otp",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Biometrics => "biometrics",
            Self::Pin => "pin",
        }
    }

    /// Parse a kind name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

/// Where a wizard saves and whether it may be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrollmentPolicy {
    /// Entered from the options pages; returns there.
    Standard,
    /// Entered during self-registration; completes sign-in when done.
    AndSave,
    /// Imposed after signing in with a fallback method; cannot be cancelled.
    Force,
}

/// Current page of the authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UiMode {
    /// Not yet resolved; `BeginAuthentication` picks the first page.
    #[default]
    PreSet,
    /// Enter the one-time code.
    Identification,
    /// Self-registration.
    Registration,
    /// Ask administrators for access.
    Invitation,
    /// Account options.
    SelectOptions,
    /// Pick another method for this sign-in.
    ChooseMethod,
    /// Change the directory password.
    ChangePassword,
    /// Complete without (further) second factor.
    Bypass,
    /// Convergence point of every refusal.
    Locking,
    /// Show the authenticator key as a QR code.
    ShowQrCode,
    /// Trigger the selected provider.
    SendAuthRequest,
    /// Mail the administrators.
    SendAdministrativeRequest,
    /// Re-issue and mail the authenticator key.
    SendKeyRequest,
    /// Authenticator wizard from options.
    EnrollOtp,
    /// Authenticator wizard during registration.
    EnrollOtpAndSave,
    /// Authenticator wizard imposed after sign-in.
    EnrollOtpForce,
    /// E-mail wizard from options.
    EnrollEmail,
    /// E-mail wizard during registration.
    EnrollEmailAndSave,
    /// E-mail wizard imposed after sign-in.
    EnrollEmailForce,
    /// Phone wizard from options.
    EnrollPhone,
    /// Phone wizard during registration.
    EnrollPhoneAndSave,
    /// Phone wizard imposed after sign-in.
    EnrollPhoneForce,
    /// Biometrics wizard from options.
    EnrollBiometrics,
    /// Biometrics wizard during registration.
    EnrollBiometricsAndSave,
    /// Biometrics wizard imposed after sign-in.
    EnrollBiometricsForce,
    /// PIN wizard from options.
    EnrollPin,
    /// PIN wizard during registration.
    EnrollPinAndSave,
    /// PIN wizard imposed after sign-in.
    EnrollPinForce,
    /// Terminal refusal; valid as a target, raises when current.
    DefinitiveError,
}

impl UiMode {
    /// Every mode.
    pub const ALL: [Self; 29] = [
        Self::PreSet,
        Self::Identification,
        Self::Registration,
        Self::Invitation,
        Self::SelectOptions,
        Self::ChooseMethod,
        Self::ChangePassword,
        Self::Bypass,
        Self::Locking,
        Self::ShowQrCode,
        Self::SendAuthRequest,
        Self::SendAdministrativeRequest,
        Self::SendKeyRequest,
        Self::EnrollOtp,
        Self::EnrollOtpAndSave,
        Self::EnrollOtpForce,
        Self::EnrollEmail,
        Self::EnrollEmailAndSave,
        Self::EnrollEmailForce,
        Self::EnrollPhone,
        Self::EnrollPhoneAndSave,
        Self::EnrollPhoneForce,
        Self::EnrollBiometrics,
        Self::EnrollBiometricsAndSave,
        Self::EnrollBiometricsForce,
        Self::EnrollPin,
        Self::EnrollPinAndSave,
        Self::EnrollPinForce,
        Self::DefinitiveError,
    ];

    /// Wizard kind and policy of an enrollment mode.
    #[must_use]
    pub const fn enrollment(self) -> Option<(EnrollmentKind, EnrollmentPolicy)> {
        use EnrollmentKind as K;
        use EnrollmentPolicy as P;
        Some(match self {
            Self::EnrollOtp => (K::Otp, P::Standard),
            Self::EnrollOtpAndSave => (K::Otp, P::AndSave),
            Self::EnrollOtpForce => (K::Otp, P::Force),
            Self::EnrollEmail => (K::Email, P::Standard),
            Self::EnrollEmailAndSave => (K::Email, P::AndSave),
            Self::EnrollEmailForce => (K::Email, P::Force),
            Self::EnrollPhone => (K::Phone, P::Standard),
            Self::EnrollPhoneAndSave => (K::Phone, P::AndSave),
            Self::EnrollPhoneForce => (K::Phone, P::Force),
            Self::EnrollBiometrics => (K::Biometrics, P::Standard),
            Self::EnrollBiometricsAndSave => (K::Biometrics, P::AndSave),
            Self::EnrollBiometricsForce => (K::Biometrics, P::Force),
            Self::EnrollPin => (K::Pin, P::Standard),
            Self::EnrollPinAndSave => (K::Pin, P::AndSave),
            Self::EnrollPinForce => (K::Pin, P::Force),
            _ => return None,
        })
    }

    /// Enrollment mode for a wizard kind and policy.
    #[must_use]
    pub const fn enroll(kind: EnrollmentKind, policy: EnrollmentPolicy) -> Self {
        use EnrollmentKind as K;
        use EnrollmentPolicy as P;
        match (kind, policy) {
            (K::Otp, P::Standard) => Self::EnrollOtp,
            (K::Otp, P::AndSave) => Self::EnrollOtpAndSave,
            (K::Otp, P::Force) => Self::EnrollOtpForce,
            (K::Email, P::Standard) => Self::EnrollEmail,
            (K::Email, P::AndSave) => Self::EnrollEmailAndSave,
            (K::Email, P::Force) => Self::EnrollEmailForce,
            (K::Phone, P::Standard) => Self::EnrollPhone,
            (K::Phone, P::AndSave) => Self::EnrollPhoneAndSave,
            (K::Phone, P::Force) => Self::EnrollPhoneForce,
            (K::Biometrics, P::Standard) => Self::EnrollBiometrics,
            (K::Biometrics, P::AndSave) => Self::EnrollBiometricsAndSave,
            (K::Biometrics, P::Force) => Self::EnrollBiometricsForce,
            (K::Pin, P::Standard) => Self::EnrollPin,
            (K::Pin, P::AndSave) => Self::EnrollPinAndSave,
            (K::Pin, P::Force) => Self::EnrollPinForce,
        }
    }
}

/// Cursor inside an enrollment wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    /// Explanation page
    #[default]
    Intro,
    /// Enter the kind-specific value
    Configure,
    /// Prove possession
    Verify,
    /// Review and save
    Confirm,
    /// Saved; leave the wizard
    Done,
}

/// State of the user's shared-secret key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyStatus {
    /// No key exists
    #[default]
    NotSet,
    /// A key exists
    Set,
    /// A key was generated during this session
    Generated,
}

// ═══════════════════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════════════════

/// Persisted MFA profile of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// User principal name
    pub upn: String,
    /// Method tried first at sign-in
    pub preferred_method: PreferredMethod,
    /// Address for e-mail codes and notices
    pub mail_address: Option<String>,
    /// Number for the external gateway
    pub phone_number: Option<String>,
    /// Companion PIN
    pub pin: Option<String>,
    /// Shared-secret key state
    pub key_status: KeyStatus,
    /// Disabled registrations go through the locking path
    pub enabled: bool,
}

impl Registration {
    /// Enabled registration with no method data.
    #[must_use]
    pub fn new(upn: impl Into<String>) -> Self {
        Self {
            upn: upn.into(),
            preferred_method: PreferredMethod::Choose,
            mail_address: None,
            phone_number: None,
            pin: None,
            key_status: KeyStatus::NotSet,
            enabled: true,
        }
    }

    /// Set the preferred method.
    #[must_use]
    pub fn with_method(mut self, method: PreferredMethod) -> Self {
        self.preferred_method = method;
        self
    }

    /// Set the mail address.
    #[must_use]
    pub fn with_mail(mut self, mail: impl Into<String>) -> Self {
        self.mail_address = Some(mail.into());
        self
    }

    /// Set the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Set the PIN.
    #[must_use]
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Set the key status.
    #[must_use]
    pub const fn with_key_status(mut self, status: KeyStatus) -> Self {
        self.key_status = status;
        self
    }

    /// Enable or disable the registration.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Posted data
// ═══════════════════════════════════════════════════════════════════════

/// What the user asked for on the posted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    /// Default button
    Submit,
    /// Go back / give up
    Cancel,
    /// Ask administrators for access
    Request,
    /// Re-issue the authenticator key
    RequestKey,
    /// Use another method for this sign-in
    ChooseMethod,
    /// Start a wizard (kind in [`fields::ENROLL`])
    Enroll,
    /// Open the password page
    ChangePassword,
    /// Store a new preferred method
    ChooseDefault,
    /// Show the authenticator key
    ShowQrCode,
}

impl FormAction {
    fn parse(value: &str) -> Option<Self> {
        Some(match value.trim().to_ascii_lowercase().as_str() {
            "" | "submit" | "next" | "done" | "ok" => Self::Submit,
            "cancel" | "back" => Self::Cancel,
            "request" => Self::Request,
            "requestkey" => Self::RequestKey,
            "choosemethod" => Self::ChooseMethod,
            "enroll" => Self::Enroll,
            "changepassword" => Self::ChangePassword,
            "choosedefault" => Self::ChooseDefault,
            "showqrcode" => Self::ShowQrCode,
            _ => return None,
        })
    }
}

/// Form fields posted with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    fields: HashMap<String, String>,
}

impl ProofData {
    /// Empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Value of a field, if posted and not blank.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Requested action; `None` when the action field is unrecognised.
    #[must_use]
    pub fn action(&self) -> Option<FormAction> {
        self.fields
            .get(fields::ACTION)
            .map_or(Some(FormAction::Submit), |value| FormAction::parse(value))
    }

    /// Whether a boolean field is set to `true`.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProofData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Outputs
// ═══════════════════════════════════════════════════════════════════════

/// Localizable message shown on the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKey {
    /// The code was wrong
    InvalidCode,
    /// The PIN was wrong
    InvalidPin,
    /// The code was already used
    ReplayDetected,
    /// The code arrived too late
    DeliveryWindowElapsed,
    /// The retry budget is exhausted
    TooManyRetries,
    /// A provider could not be reached
    ProviderUnavailable,
    /// A code was sent
    CodeSent,
    /// The account is disabled
    AccountDisabled,
    /// The user is not registered
    NotRegistered,
    /// No method can be used
    NoUsableMethod,
    /// The administrators were asked for access
    RequestSent,
    /// A mail could not be sent
    MailFailed,
    /// The authenticator key was re-issued
    KeySent,
    /// Unknown or disabled method
    InvalidMethod,
    /// Malformed e-mail address
    InvalidEmail,
    /// Malformed phone number
    InvalidPhone,
    /// PIN of the wrong length or with non-digits
    InvalidPinFormat,
    /// PIN confirmation differs
    PinMismatch,
    /// This wizard cannot be cancelled
    CancelNotAllowed,
    /// The operation is not permitted
    NotAllowed,
    /// Registration saved
    RegistrationSaved,
    /// Registration could not be saved
    RegistrationFailed,
    /// Password confirmation differs
    PasswordMismatch,
    /// Password changed
    PasswordChanged,
    /// Password change refused
    PasswordChangeFailed,
    /// The user gave up
    AuthenticationCancelled,
}

/// Severity of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Informational
    Info,
    /// Something went wrong
    Error,
}

/// Message shown on the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// What to show
    pub key: MessageKey,
    /// How to show it
    pub severity: Severity,
}

impl Message {
    /// Informational message.
    #[must_use]
    pub const fn info(key: MessageKey) -> Self {
        Self { key, severity: Severity::Info }
    }

    /// Error message.
    #[must_use]
    pub const fn error(key: MessageKey) -> Self {
        Self { key, severity: Severity::Error }
    }
}

/// Claim returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type URI
    pub claim_type: String,
    /// Claim value
    pub value: String,
}

impl Claim {
    /// Authentication-method claim for `method`.
    #[must_use]
    pub fn authentication_method(method: PreferredMethod) -> Self {
        Self {
            claim_type: AUTHENTICATION_METHOD_CLAIM.to_string(),
            value: method.claim_value().to_string(),
        }
    }
}

/// Cookie to set on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
}

/// Request-level failure raised to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The locking path ended on the definitive error.
    Definitive(MessageKey),
    /// The request did not fit the session or a required collaborator failed.
    Internal(String),
}

/// Per-request results; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOutput {
    /// `Some` once the session is complete
    pub claims: Option<Vec<Claim>>,
    /// Cookies to set
    pub cookies: Vec<Cookie>,
    /// Failure to raise
    pub fault: Option<Fault>,
}

/// Page the host must render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    /// User principal name
    pub upn: String,
    /// Page to render
    pub mode: UiMode,
    /// Wizard cursor, for enrollment modes
    pub wizard_step: Option<WizardStep>,
    /// Message to show
    pub message: Option<Message>,
    /// Method in use
    pub selected_method: PreferredMethod,
    /// Methods the user may pick on this page
    pub offered_methods: Vec<PreferredMethod>,
    /// Provider self-service link, on the options page
    pub account_management_url: Option<String>,
    /// Whether the options pages were requested
    pub show_options: bool,
    /// Retries left before lockout
    pub remaining_retries: u32,
    /// Cookies to set
    #[serde(skip)]
    pub cookies: Vec<Cookie>,
}

/// Result of `TryEndAuthentication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Next page; `None` once authentication is complete
    pub presentation: Option<Presentation>,
    /// Claims issued on completion
    pub claims: Vec<Claim>,
}

impl AuthOutcome {
    /// Whether the host can finish the sign-in.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.presentation.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════

/// Per-attempt state threaded through every handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// User principal name
    pub upn: String,
    /// Start of this attempt; anchors the delivery window
    pub logon_date: DateTime<Utc>,
    /// Client address, recorded by the replay check
    pub ip_address: IpAddr,

    /// Current page
    pub ui_mode: UiMode,
    /// Where to go after an intermediate page
    pub target_mode: Option<UiMode>,
    /// Cursor inside an enrollment wizard
    pub wizard_step: WizardStep,

    /// Method from the registration
    pub preferred_method: PreferredMethod,
    /// Method tried first for this attempt
    pub first_choice_method: PreferredMethod,
    /// Method actually used
    pub selected_method: PreferredMethod,
    /// Method picked on the choose-method page for this attempt
    pub override_method: Option<PreferredMethod>,

    /// Mirrored from the registration
    pub mail_address: Option<String>,
    /// Mirrored from the registration
    pub phone_number: Option<String>,
    /// Mirrored from the registration
    pub pin_code: Option<String>,
    /// Mirrored from the registration
    pub key_status: KeyStatus,
    /// A key was issued during this attempt
    pub key_changed: bool,

    /// Failed attempts so far
    pub current_retries: u32,
    /// The enrollment notice was already sent
    pub notification_sent: bool,
    /// Land on the options pages after identification
    pub show_options: bool,
    /// Registration enabled flag
    pub enabled: bool,
    /// A registration exists
    pub is_registered: bool,
    /// Selected provider sends the code out of band
    pub is_remote: bool,
    /// Selected provider verifies without code entry
    pub is_two_way: bool,

    /// Unsaved registration edited by a wizard
    pub working_registration: Option<Registration>,
    /// Claims earned, issued when the session completes
    pub pending_claims: Vec<Claim>,
    /// Methods offered on the current page
    pub offered_methods: Vec<PreferredMethod>,
    /// Provider self-service link
    pub account_management_url: Option<String>,
    /// Message for the next page
    pub message: Option<Message>,

    /// Results of the current request
    #[serde(skip)]
    pub output: RequestOutput,
}

impl SessionState {
    /// Fresh attempt for `upn` starting at `logon_date`.
    #[must_use]
    pub fn new(upn: impl Into<String>, ip_address: IpAddr, logon_date: DateTime<Utc>) -> Self {
        Self {
            upn: upn.into(),
            logon_date,
            ip_address,
            ui_mode: UiMode::PreSet,
            target_mode: None,
            wizard_step: WizardStep::Intro,
            preferred_method: PreferredMethod::Choose,
            first_choice_method: PreferredMethod::Choose,
            selected_method: PreferredMethod::Choose,
            override_method: None,
            mail_address: None,
            phone_number: None,
            pin_code: None,
            key_status: KeyStatus::NotSet,
            key_changed: false,
            current_retries: 0,
            notification_sent: false,
            show_options: false,
            enabled: false,
            is_registered: false,
            is_remote: false,
            is_two_way: false,
            working_registration: None,
            pending_claims: Vec::new(),
            offered_methods: Vec::new(),
            account_management_url: None,
            message: None,
            output: RequestOutput::default(),
        }
    }

    /// Copy a registration into the session.
    pub fn apply_registration(&mut self, registration: &Registration) {
        self.is_registered = true;
        self.enabled = registration.enabled;
        self.preferred_method = registration.preferred_method;
        self.mail_address.clone_from(&registration.mail_address);
        self.phone_number.clone_from(&registration.phone_number);
        self.pin_code.clone_from(&registration.pin);
        self.key_status = registration.key_status;
    }

    /// Registration as currently mirrored by the session.
    #[must_use]
    pub fn registration(&self) -> Registration {
        Registration {
            upn: self.upn.clone(),
            preferred_method: self.preferred_method,
            mail_address: self.mail_address.clone(),
            phone_number: self.phone_number.clone(),
            pin: self.pin_code.clone(),
            key_status: self.key_status,
            enabled: self.enabled,
        }
    }

    /// Clear the outputs of the previous request.
    pub fn begin_request(&mut self) {
        self.output = RequestOutput::default();
        self.message = None;
    }

    /// Set the current page.
    pub fn go_to(&mut self, mode: UiMode) {
        if self.ui_mode != mode {
            tracing::debug!(upn = %self.upn, from = ?self.ui_mode, to = ?mode, "Mode transition");
        }
        self.ui_mode = mode;
    }

    /// Page for the host to render.
    #[must_use]
    pub fn presentation(&self, max_retries: u32) -> Presentation {
        Presentation {
            upn: self.upn.clone(),
            mode: self.ui_mode,
            wizard_step: self.ui_mode.enrollment().map(|_| self.wizard_step),
            message: self.message,
            selected_method: self.selected_method,
            offered_methods: self.offered_methods.clone(),
            account_management_url: self.account_management_url.clone(),
            show_options: self.show_options,
            remaining_retries: max_retries.saturating_sub(self.current_retries),
            cookies: self.output.cookies.clone(),
        }
    }
}
