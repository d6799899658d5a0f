//! Second-factor channels.

use super::ProviderContext;
use crate::actions::ResponseKind;
use crate::error::Result;
use crate::state::PreferredMethod;
use std::future::Future;

/// How a channel delivers and checks codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The code is sent out of band rather than computed on the user's device.
    pub is_remote: bool,
    /// The channel verifies the user itself; no code is entered.
    pub is_two_way: bool,
}

/// Optional input elements of the code page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiElement {
    /// Code input
    Code,
    /// Companion PIN input
    Pin,
    /// Link to the provider's self-service page
    AccountManagement,
}

/// All second-factor channels, addressed by method.
///
/// Availability and capability queries are answered synchronously from
/// configuration; calls that reach the channel are async and may fail.
/// Failures are turned into [`ResponseKind::Error`] by the reducer's
/// effects, never raised to the host.
pub trait AuthenticationProvider: Send + Sync {
    /// Whether `method` can be used for this user right now.
    fn is_available(&self, method: PreferredMethod, context: &ProviderContext) -> bool;

    /// Delivery capabilities of `method`.
    fn capabilities(&self, method: PreferredMethod) -> Capabilities;

    /// Whether the page for `method` shows `element`.
    fn is_ui_element_required(&self, method: PreferredMethod, element: UiElement) -> bool;

    /// Whether the user must enroll before `method` can be used.
    fn requires_enrollment(&self, method: PreferredMethod, context: &ProviderContext) -> bool;

    /// Send a code (or trigger a push) through `method`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be reached.
    fn post_authentication_request(
        &self,
        method: PreferredMethod,
        context: &ProviderContext,
    ) -> impl Future<Output = Result<ResponseKind>> + Send;

    /// Check `code`, or wait for the two-way answer when `code` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be reached.
    fn set_authentication_result(
        &self,
        method: PreferredMethod,
        context: &ProviderContext,
        code: &str,
    ) -> impl Future<Output = Result<ResponseKind>> + Send;

    /// Register a credential for `method` (biometrics).
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be reached.
    fn enroll(
        &self,
        method: PreferredMethod,
        context: &ProviderContext,
    ) -> impl Future<Output = Result<ResponseKind>> + Send;

    /// Link to the provider's self-service page.
    fn account_management_url(&self, method: PreferredMethod, context: &ProviderContext) -> Option<String>;
}
