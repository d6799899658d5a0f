//! Registration store trait.

use crate::error::Result;
use crate::state::Registration;
use std::future::Future;

/// Persisted MFA profiles.
///
/// Writes replace the whole registration; there is no partial update.
pub trait RegistrationStore: Send + Sync {
    /// Load the registration of `upn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_registration(&self, upn: &str) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// Store `registration`, issuing a new shared-secret key when
    /// `force_key_regen` is set. Returns the registration as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn set_registration(
        &self,
        registration: Registration,
        force_key_regen: bool,
    ) -> impl Future<Output = Result<Registration>> + Send;

    /// Change the directory password of `upn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory refuses the change.
    fn change_password(
        &self,
        upn: &str,
        old_password: &str,
        new_password: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
