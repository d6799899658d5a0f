//! Mock mail provider.

use super::guard;
use crate::error::{AdapterError, Result};
use crate::providers::MailProvider;
use crate::state::EnrollmentKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One mail seen by [`MockMailProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailSent {
    /// Enrollment notice
    EnrollmentNotice {
        /// Recipient
        to: String,
        /// Wizard started
        kind: EnrollmentKind,
    },
    /// Access request to administrators
    AdministrativeRequest {
        /// Recipients
        administrators: Vec<String>,
        /// Requesting user
        upn: String,
    },
    /// Authenticator key
    Key {
        /// Recipient
        to: String,
    },
}

/// Records mails instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct MockMailProvider {
    sent: Arc<Mutex<Vec<MailSent>>>,
    failing: Arc<AtomicBool>,
}

impl MockMailProvider {
    /// Provider that accepts every mail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that fails every mail.
    #[must_use]
    pub fn failing() -> Self {
        let provider = Self::default();
        provider.failing.store(true, Ordering::SeqCst);
        provider
    }

    /// Mails accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<MailSent> {
        guard(&self.sent).clone()
    }

    fn deliver(&self, mail: MailSent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AdapterError::Mail("relay refused".into()));
        }
        guard(&self.sent).push(mail);
        Ok(())
    }
}

impl MailProvider for MockMailProvider {
    async fn send_enrollment_notice(&self, to: &str, _upn: &str, kind: EnrollmentKind) -> Result<()> {
        self.deliver(MailSent::EnrollmentNotice {
            to: to.to_string(),
            kind,
        })
    }

    async fn send_administrative_request(&self, administrators: &[String], upn: &str) -> Result<()> {
        self.deliver(MailSent::AdministrativeRequest {
            administrators: administrators.to_vec(),
            upn: upn.to_string(),
        })
    }

    async fn send_key(&self, to: &str, _upn: &str) -> Result<()> {
        self.deliver(MailSent::Key { to: to.to_string() })
    }
}
