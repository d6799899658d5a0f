//! Mail delivery trait.

use crate::error::Result;
use crate::state::EnrollmentKind;
use std::future::Future;

/// Sends the adapter's notification mails.
pub trait MailProvider: Send + Sync {
    /// Tell `upn` that an enrollment wizard was started.
    ///
    /// # Errors
    ///
    /// Returns an error if the mail cannot be sent.
    fn send_enrollment_notice(
        &self,
        to: &str,
        upn: &str,
        kind: EnrollmentKind,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ask `administrators` to grant `upn` access.
    ///
    /// # Errors
    ///
    /// Returns an error if the mail cannot be sent.
    fn send_administrative_request(
        &self,
        administrators: &[String],
        upn: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Mail a freshly issued authenticator key to `upn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mail cannot be sent.
    fn send_key(&self, to: &str, upn: &str) -> impl Future<Output = Result<()>> + Send;
}
