//! The in-memory replay list.

use crate::record::{ReplayLevel, ReplayRecord};
use chrono::{DateTime, Utc};
use farm_mfa_runtime::metrics::ReplayMetrics;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Codes seen within their delivery window.
///
/// This is a sliding window, not a consumption ledger: accepted records are
/// never removed when the code is used, only by [`ReplaySet::purge_expired`].
/// All access goes through one mutex and no I/O happens while it is held, so
/// a check never waits on a feed download.
///
/// Cloning yields another handle to the same list.
#[derive(Debug, Clone, Default)]
pub struct ReplaySet {
    records: Arc<Mutex<Vec<ReplayRecord>>>,
}

impl ReplaySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Records are independent of each other; a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<ReplayRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an attempt; `true` when it is novel, `false` for a replay.
    ///
    /// `Disabled` records are always accepted and never stored.
    pub fn add_to_replay(&self, record: ReplayRecord) -> bool {
        if record.replay_level == ReplayLevel::Disabled {
            ReplayMetrics::record_check(true);
            return true;
        }

        let mut records = self.lock();
        if records.iter().any(|seen| record.is_replay_of(seen)) {
            drop(records);
            tracing::warn!(
                user = %record.user_name,
                ip = %record.user_ip_address,
                level = ?record.replay_level,
                "Replayed code rejected"
            );
            ReplayMetrics::record_check(false);
            return false;
        }

        records.push(record);
        let held = records.len();
        drop(records);
        ReplayMetrics::record_check(true);
        ReplayMetrics::record_size(held);
        true
    }

    /// Forget every record. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        let mut records = self.lock();
        let cleared = records.len();
        records.clear();
        drop(records);
        ReplayMetrics::record_size(0);
        tracing::info!(cleared, "Replay cache reset");
        cleared
    }

    /// Remove every record expired at `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|record| !record.is_expired(now));
        let remaining = records.len();
        drop(records);

        let purged = before - remaining;
        ReplayMetrics::record_cleanup(purged, remaining);
        if purged > 0 {
            tracing::debug!(purged, remaining, "Expired replay records purged");
        }
        purged
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a record for this user and code is held, whatever its address.
    #[must_use]
    pub fn contains(&self, user_name: &str, code: &str) -> bool {
        self.lock()
            .iter()
            .any(|r| r.user_name.eq_ignore_ascii_case(user_name) && r.code == code)
    }
}
