//! Mock replay guard.

use crate::error::{AdapterError, Result};
use crate::providers::ReplayGuard;
use farm_mfa_replay::{ReplayError, ReplayRecord, ReplaySet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Replay guard over a local [`ReplaySet`] that can be switched off.
#[derive(Debug, Clone, Default)]
pub struct MockReplayGuard {
    records: ReplaySet,
    unavailable: Arc<AtomicBool>,
}

impl MockReplayGuard {
    /// Guard with an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard whose checks fail.
    #[must_use]
    pub fn unavailable() -> Self {
        let guard = Self::default();
        guard.unavailable.store(true, Ordering::SeqCst);
        guard
    }

    /// The underlying list.
    #[must_use]
    pub const fn records(&self) -> &ReplaySet {
        &self.records
    }
}

impl ReplayGuard for MockReplayGuard {
    async fn check(&self, record: ReplayRecord) -> Result<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdapterError::Replay(ReplayError::Status {
                url: "replay".into(),
                status: 503,
            }));
        }
        Ok(self.records.add_to_replay(record))
    }
}
