//! Mock registration store.

use super::guard;
use crate::error::{AdapterError, Result};
use crate::providers::RegistrationStore;
use crate::state::{KeyStatus, Registration};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory registration store.
///
/// Issued keys are random base64 strings kept per user so tests can check
/// that a key was (re)generated.
#[derive(Debug, Clone, Default)]
pub struct MockRegistrationStore {
    registrations: Arc<Mutex<HashMap<String, Registration>>>,
    keys: Arc<Mutex<HashMap<String, String>>>,
    passwords: Arc<Mutex<HashMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MockRegistrationStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registration.
    #[must_use]
    pub fn with_registration(self, registration: Registration) -> Self {
        guard(&self.registrations).insert(registration.upn.to_lowercase(), registration);
        self
    }

    /// Seed the current directory password of `upn`.
    #[must_use]
    pub fn with_password(self, upn: &str, password: impl Into<String>) -> Self {
        guard(&self.passwords).insert(upn.to_lowercase(), password.into());
        self
    }

    /// Fail every read.
    #[must_use]
    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    /// Fail every write.
    #[must_use]
    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    /// Stored registration of `upn`.
    #[must_use]
    pub fn registration(&self, upn: &str) -> Option<Registration> {
        guard(&self.registrations).get(&upn.to_lowercase()).cloned()
    }

    /// Last key issued to `upn`.
    #[must_use]
    pub fn key(&self, upn: &str) -> Option<String> {
        guard(&self.keys).get(&upn.to_lowercase()).cloned()
    }

    /// Current directory password of `upn`.
    #[must_use]
    pub fn password(&self, upn: &str) -> Option<String> {
        guard(&self.passwords).get(&upn.to_lowercase()).cloned()
    }

    /// Successful writes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl RegistrationStore for MockRegistrationStore {
    async fn get_registration(&self, upn: &str) -> Result<Option<Registration>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AdapterError::Registration("store offline".into()));
        }
        Ok(self.registration(upn))
    }

    async fn set_registration(&self, mut registration: Registration, force_key_regen: bool) -> Result<Registration> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AdapterError::Registration("store offline".into()));
        }
        let upn = registration.upn.to_lowercase();
        if force_key_regen {
            let mut secret = [0u8; 20];
            rand::thread_rng().fill_bytes(&mut secret);
            guard(&self.keys).insert(upn.clone(), STANDARD.encode(secret));
            registration.key_status = KeyStatus::Generated;
        }
        guard(&self.registrations).insert(upn, registration.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(registration)
    }

    async fn change_password(&self, upn: &str, old_password: &str, new_password: &str) -> Result<()> {
        let mut passwords = guard(&self.passwords);
        let upn = upn.to_lowercase();
        if passwords.get(&upn).is_some_and(|current| current != old_password) {
            return Err(AdapterError::Registration("current password does not match".into()));
        }
        passwords.insert(upn, new_password.to_string());
        Ok(())
    }
}
