//! Mock authentication provider hub.

use super::guard;
use crate::actions::ResponseKind;
use crate::error::{AdapterError, Result};
use crate::providers::{AuthenticationProvider, Capabilities, ProviderContext, UiElement};
use crate::state::PreferredMethod;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How one method of a [`MockProviderHub`] behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodScript {
    /// Answer of `is_available`
    pub available: bool,
    /// Answer of `capabilities`
    pub capabilities: Capabilities,
    /// Answer of `requires_enrollment`
    pub requires_enrollment: bool,
    /// Answer of `post_authentication_request` and `enroll`
    pub post_response: ResponseKind,
    /// Answer of a two-way `set_authentication_result`
    pub two_way_response: ResponseKind,
    /// Every call fails with a provider error
    pub unreachable: bool,
}

impl Default for MethodScript {
    fn default() -> Self {
        Self {
            available: true,
            capabilities: Capabilities::default(),
            requires_enrollment: false,
            post_response: ResponseKind::Success,
            two_way_response: ResponseKind::Success,
            unreachable: false,
        }
    }
}

/// One call seen by [`MockProviderHub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `post_authentication_request`
    Post(PreferredMethod),
    /// `set_authentication_result` with the submitted code
    Verify(PreferredMethod, String),
    /// `enroll`
    Enroll(PreferredMethod),
}

/// Scriptable provider hub.
///
/// Every method is available, local and accepts [`MockProviderHub::VALID_CODE`]
/// unless scripted otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockProviderHub {
    scripts: Arc<Mutex<HashMap<PreferredMethod, MethodScript>>>,
    valid_code: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
}

impl MockProviderHub {
    /// Code accepted by default.
    pub const VALID_CODE: &'static str = "123456";

    /// Self-service link returned for every method.
    pub const ACCOUNT_URL: &'static str = "https://account.contoso.com/mfa";

    /// Hub where every method works.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the script of `method`.
    #[must_use]
    pub fn with_method(self, method: PreferredMethod, script: MethodScript) -> Self {
        guard(&self.scripts).insert(method, script);
        self
    }

    /// Edit the script of `method`.
    #[must_use]
    pub fn script(self, method: PreferredMethod, edit: impl FnOnce(&mut MethodScript)) -> Self {
        edit(guard(&self.scripts).entry(method).or_default());
        self
    }

    /// Accept `code` instead of [`MockProviderHub::VALID_CODE`].
    #[must_use]
    pub fn with_valid_code(self, code: impl Into<String>) -> Self {
        *guard(&self.valid_code) = Some(code.into());
        self
    }

    /// Calls seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        guard(&self.calls).clone()
    }

    fn script_of(&self, method: PreferredMethod) -> MethodScript {
        guard(&self.scripts).get(&method).cloned().unwrap_or_default()
    }

    fn record(&self, call: ProviderCall, script: &MethodScript) -> Result<()> {
        guard(&self.calls).push(call);
        if script.unreachable {
            return Err(AdapterError::Provider("provider unreachable".into()));
        }
        Ok(())
    }
}

impl AuthenticationProvider for MockProviderHub {
    fn is_available(&self, method: PreferredMethod, _context: &ProviderContext) -> bool {
        method.is_primary() && self.script_of(method).available
    }

    fn capabilities(&self, method: PreferredMethod) -> Capabilities {
        self.script_of(method).capabilities
    }

    fn is_ui_element_required(&self, method: PreferredMethod, element: UiElement) -> bool {
        match element {
            UiElement::Code => !self.script_of(method).capabilities.is_two_way,
            UiElement::Pin | UiElement::AccountManagement => true,
        }
    }

    fn requires_enrollment(&self, method: PreferredMethod, _context: &ProviderContext) -> bool {
        self.script_of(method).requires_enrollment
    }

    async fn post_authentication_request(
        &self,
        method: PreferredMethod,
        _context: &ProviderContext,
    ) -> Result<ResponseKind> {
        let script = self.script_of(method);
        self.record(ProviderCall::Post(method), &script)?;
        Ok(script.post_response)
    }

    async fn set_authentication_result(
        &self,
        method: PreferredMethod,
        _context: &ProviderContext,
        code: &str,
    ) -> Result<ResponseKind> {
        let script = self.script_of(method);
        self.record(ProviderCall::Verify(method, code.to_string()), &script)?;
        if script.capabilities.is_two_way && code.is_empty() {
            return Ok(script.two_way_response);
        }
        let valid = guard(&self.valid_code)
            .clone()
            .unwrap_or_else(|| Self::VALID_CODE.to_string());
        Ok(if code == valid {
            ResponseKind::Success
        } else {
            ResponseKind::Failure
        })
    }

    async fn enroll(&self, method: PreferredMethod, _context: &ProviderContext) -> Result<ResponseKind> {
        let script = self.script_of(method);
        self.record(ProviderCall::Enroll(method), &script)?;
        Ok(script.post_response)
    }

    fn account_management_url(&self, _method: PreferredMethod, _context: &ProviderContext) -> Option<String> {
        Some(Self::ACCOUNT_URL.to_string())
    }
}
