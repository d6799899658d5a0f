//! Claim URIs, form field names and event-log codes.

/// Claim type carrying the authentication method.
pub const AUTHENTICATION_METHOD_CLAIM: &str =
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/authenticationmethod";

/// Claim values of [`AUTHENTICATION_METHOD_CLAIM`], one per method.
pub mod claims {
    /// One-time code from an authenticator app
    pub const CODE: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/otp";
    /// One-time code sent by e-mail
    pub const EMAIL: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/email";
    /// One-time code or call through an external SMS/voice gateway
    pub const EXTERNAL: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/smsotp";
    /// Push notification to a phone app
    pub const AZURE: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/phoneappnotification";
    /// Platform biometrics
    pub const BIOMETRICS: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/biometrics";
    /// Companion PIN
    pub const PIN: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/pin";
    /// Bypassed second factor
    pub const NONE: &str = "http://schemas.microsoft.com/ws/2012/12/authmethod/none";

    /// Every claim value the adapter may issue.
    pub const ALL: [&str; 7] = [CODE, EMAIL, EXTERNAL, AZURE, BIOMETRICS, PIN, NONE];
}

/// Names of the posted form fields.
pub mod fields {
    /// What the user asked for (see [`crate::state::FormAction`])
    pub const ACTION: &str = "action";
    /// One-time code or biometric assertion
    pub const CODE: &str = "code";
    /// Companion PIN
    pub const PIN: &str = "pin";
    /// Method name
    pub const METHOD: &str = "method";
    /// Enrollment kind for `enroll` actions
    pub const ENROLL: &str = "enroll";
    /// E-mail address
    pub const EMAIL: &str = "email";
    /// Phone number
    pub const PHONE: &str = "phone";
    /// `true` to remember a chosen method as preferred
    pub const REMEMBER: &str = "remember";
    /// Current password
    pub const OLD_PASSWORD: &str = "oldpwd";
    /// New password
    pub const NEW_PASSWORD: &str = "newpwd";
    /// New password, repeated
    pub const CONFIRM_PASSWORD: &str = "cnfpwd";
}

/// URL marker requesting the options pages after sign-in.
pub const OPTIONS_URL_MARKER: &str = "mfaopts";

/// Cookie remembering that options were requested.
pub const OPTIONS_COOKIE: &str = "showoptions";

/// Key of the serialized session inside the host context.
pub const SESSION_CONTEXT_KEY: &str = "farm-mfa.session";

/// Supported UI locales.
pub const SUPPORTED_LOCALES: [&str; 6] = ["en", "fr", "de", "es", "it", "nl"];

/// Event-log codes attached as `event_id` to warning and error logs.
pub mod event_ids {
    /// The configuration could not be parsed or validated.
    pub const CONFIGURATION_INVALID: u32 = 5000;
    /// The registration store could not be read.
    pub const REGISTRATION_LOAD_FAILED: u32 = 5001;
    /// The registration store rejected a write.
    pub const REGISTRATION_SAVE_FAILED: u32 = 5002;
    /// An authentication provider failed.
    pub const PROVIDER_FAILED: u32 = 5003;
    /// A mail could not be sent.
    pub const MAIL_FAILED: u32 = 5004;
    /// A one-time code was replayed.
    pub const REPLAY_DETECTED: u32 = 5005;
    /// The replay check could not be performed.
    pub const REPLAY_UNAVAILABLE: u32 = 5006;
    /// The retry budget or the delivery window was exhausted.
    pub const LOCKOUT: u32 = 5007;
    /// A session ended on the definitive error.
    pub const DEFINITIVE_ERROR: u32 = 5008;
    /// A request did not match the session state.
    pub const STATE_ERROR: u32 = 5009;
}
