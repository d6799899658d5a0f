//! Adapter configuration.
//!
//! The host hands the adapter an opaque configuration blob when the pipeline
//! loads. It is parsed once into an [`AdapterConfig`] and shared by `Arc`
//! with every request; nothing is re-read per request.

use crate::error::{AdapterError, Result};
use crate::state::PreferredMethod;
use farm_mfa_replay::ReplayLevel;
use serde::{Deserialize, Serialize};

/// Tenant feature flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserFeatures {
    /// Only administrators create registrations.
    pub administrative_mode: bool,
    /// Unregistered users may ask for an invitation.
    pub allow_unregistered: bool,
    /// Unregistered users sign in without a second factor.
    pub bypass_unregistered: bool,
    /// Disabled users may ask for an invitation.
    pub allow_disabled: bool,
    /// Disabled users sign in without a second factor.
    pub bypass_disabled: bool,
    /// Users may register themselves.
    pub allow_provide_information: bool,
    /// Users may open the options pages.
    pub allow_manage_options: bool,
    /// Users may change their password from the options pages.
    pub allow_change_password: bool,
}

/// How strictly a second factor is demanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaPolicy {
    /// Every user must pass a second factor.
    Required,
    /// Users without a usable registration are invited rather than refused.
    Allowed,
    /// Users without a usable registration are let through.
    NotRequired,
    /// Any other combination.
    Mixed,
}

/// How users obtain a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationPolicy {
    /// Users must register themselves before signing in.
    Required,
    /// Users may register themselves or continue without.
    Allowed,
    /// Users never register themselves.
    NotRequired,
    /// Any other combination.
    Mixed,
}

impl UserFeatures {
    /// Second-factor policy implied by the flags.
    #[must_use]
    pub const fn mfa_policy(&self) -> MfaPolicy {
        let bypass = self.bypass_unregistered || self.bypass_disabled;
        let allow = self.allow_unregistered || self.allow_disabled;
        if self.bypass_unregistered && self.bypass_disabled {
            MfaPolicy::NotRequired
        } else if !bypass && !allow {
            MfaPolicy::Required
        } else if !bypass && self.allow_unregistered && self.allow_disabled {
            MfaPolicy::Allowed
        } else {
            MfaPolicy::Mixed
        }
    }

    /// Registration policy implied by the flags.
    #[must_use]
    pub const fn registration_policy(&self) -> RegistrationPolicy {
        let escape = self.allow_unregistered || self.bypass_unregistered;
        match (self.allow_provide_information && !self.administrative_mode, escape) {
            (true, false) => RegistrationPolicy::Required,
            (true, true) => RegistrationPolicy::Allowed,
            (false, true) if self.bypass_unregistered => RegistrationPolicy::NotRequired,
            _ => RegistrationPolicy::Mixed,
        }
    }

    /// Whether unregistered users may register themselves.
    #[must_use]
    pub const fn self_registration(&self) -> bool {
        self.allow_provide_information && !self.administrative_mode
    }
}

/// Configuration shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdapterConfig {
    /// Failed attempts before lockout (default: 3)
    pub max_retries: u32,
    /// Seconds a code stays valid after logon (default: 300)
    pub delivery_window: u32,
    /// Replay protection level (default: `Full`)
    pub replay_level: ReplayLevel,
    /// Tenant feature flags
    pub features: UserFeatures,
    /// Methods that may be used at all
    pub enabled_methods: Vec<PreferredMethod>,
    /// Methods tried, in order, after the first choice
    pub fallback_order: Vec<PreferredMethod>,
    /// Method used when the registration says `Choose` and no choice is offered
    pub default_method: PreferredMethod,
    /// Offer the choose-method page to users whose registration says `Choose`
    pub allow_choose: bool,
    /// Require the companion PIN after a valid code
    pub pin_required: bool,
    /// Number of digits in a PIN (default: 4)
    pub pin_length: usize,
    /// Recipients of administrative requests
    pub administrators: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delivery_window: 300,
            replay_level: ReplayLevel::Full,
            features: UserFeatures::default(),
            enabled_methods: PreferredMethod::PRIMARY.to_vec(),
            fallback_order: PreferredMethod::PRIMARY.to_vec(),
            default_method: PreferredMethod::Code,
            allow_choose: false,
            pin_required: false,
            pin_length: 4,
            administrators: Vec::new(),
        }
    }
}

impl AdapterConfig {
    /// Parse and validate the pipeline configuration blob.
    ///
    /// An empty blob yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the JSON is malformed or
    /// fails [`AdapterConfig::validate`].
    pub fn from_json(config_data: &str) -> Result<Self> {
        let config: Self = if config_data.trim().is_empty() {
            Self::default()
        } else {
            serde_json::from_str(config_data)
                .map_err(|e| AdapterError::Configuration(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(AdapterError::Configuration("maxRetries must be at least 1".into()));
        }
        if self.delivery_window == 0 {
            return Err(AdapterError::Configuration("deliveryWindow must be positive".into()));
        }
        if !(4..=8).contains(&self.pin_length) {
            return Err(AdapterError::Configuration("pinLength must be between 4 and 8".into()));
        }
        if let Some(method) = self
            .enabled_methods
            .iter()
            .chain(&self.fallback_order)
            .find(|method| !method.is_primary())
        {
            return Err(AdapterError::Configuration(format!(
                "{method} cannot be used as an authentication method"
            )));
        }
        if !self.default_method.is_primary() {
            return Err(AdapterError::Configuration(format!(
                "defaultMethod {} is not an authentication method",
                self.default_method
            )));
        }
        Ok(())
    }

    /// Whether `method` may be used.
    #[must_use]
    pub fn is_method_enabled(&self, method: PreferredMethod) -> bool {
        self.enabled_methods.contains(&method)
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delivery window in seconds.
    #[must_use]
    pub const fn with_delivery_window(mut self, seconds: u32) -> Self {
        self.delivery_window = seconds;
        self
    }

    /// Set the replay level.
    #[must_use]
    pub const fn with_replay_level(mut self, level: ReplayLevel) -> Self {
        self.replay_level = level;
        self
    }

    /// Set the feature flags.
    #[must_use]
    pub const fn with_features(mut self, features: UserFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the enabled methods.
    #[must_use]
    pub fn with_enabled_methods(mut self, methods: impl Into<Vec<PreferredMethod>>) -> Self {
        self.enabled_methods = methods.into();
        self
    }

    /// Set the fallback order.
    #[must_use]
    pub fn with_fallback_order(mut self, methods: impl Into<Vec<PreferredMethod>>) -> Self {
        self.fallback_order = methods.into();
        self
    }

    /// Set the default method.
    #[must_use]
    pub const fn with_default_method(mut self, method: PreferredMethod) -> Self {
        self.default_method = method;
        self
    }

    /// Offer the choose-method page.
    #[must_use]
    pub const fn with_allow_choose(mut self, allow: bool) -> Self {
        self.allow_choose = allow;
        self
    }

    /// Require the companion PIN.
    #[must_use]
    pub const fn with_pin_required(mut self, required: bool) -> Self {
        self.pin_required = required;
        self
    }

    /// Set the administrators mailed by invitation requests.
    #[must_use]
    pub fn with_administrators(mut self, administrators: impl Into<Vec<String>>) -> Self {
        self.administrators = administrators.into();
        self
    }
}
