//! Mock collaborators for testing.
//!
//! In-memory, scriptable implementations of every collaborator trait. Each
//! mock records the calls it receives so tests can assert on them.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod mail;
pub mod provider;
pub mod registration;
pub mod replay;

pub use mail::{MailSent, MockMailProvider};
pub use provider::{MethodScript, MockProviderHub, ProviderCall};
pub use registration::MockRegistrationStore;
pub use replay::MockReplayGuard;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
