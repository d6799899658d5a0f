//! Replay records and replay levels.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// How strictly duplicate code submissions are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplayLevel {
    /// No replay protection; every code is accepted.
    Disabled,
    /// Same user and code are a replay only from the same source address.
    Intermediate,
    /// Same user and code are a replay regardless of source address.
    #[default]
    Full,
}

/// One code-verification attempt that reached the replay check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    /// User principal name; compared case-insensitively.
    pub user_name: String,
    /// The submitted one-time code; compared exactly.
    pub code: String,
    /// Source address of the submission.
    pub user_ip_address: IpAddr,
    /// Logon timestamp of the authentication attempt.
    pub user_logon: DateTime<Utc>,
    /// Seconds the code stays valid after `user_logon`.
    pub delivery_window: u32,
    /// Policy applied when this record is checked.
    pub replay_level: ReplayLevel,
    /// Relay this record to the other farm nodes.
    pub must_dispatch: bool,
}

impl ReplayRecord {
    /// Create a record that will be relayed to the farm.
    pub fn new(
        user_name: impl Into<String>,
        code: impl Into<String>,
        user_ip_address: IpAddr,
        user_logon: DateTime<Utc>,
        delivery_window: u32,
        replay_level: ReplayLevel,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            code: code.into(),
            user_ip_address,
            user_logon,
            delivery_window,
            replay_level,
            must_dispatch: true,
        }
    }

    /// Set the dispatch flag.
    #[must_use]
    pub fn with_dispatch(mut self, must_dispatch: bool) -> Self {
        self.must_dispatch = must_dispatch;
        self
    }

    /// `user_logon + delivery_window`.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.user_logon + Duration::seconds(i64::from(self.delivery_window))
    }

    /// Whether the record may be purged at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// Whether this attempt replays `seen` under this record's level.
    ///
    /// Expiry is not considered: a stale record still counts until the
    /// cleanup loop removes it.
    #[must_use]
    pub fn is_replay_of(&self, seen: &Self) -> bool {
        let same_code = || {
            self.user_name.eq_ignore_ascii_case(&seen.user_name) && self.code == seen.code
        };
        match self.replay_level {
            ReplayLevel::Disabled => false,
            ReplayLevel::Intermediate => {
                same_code() && self.user_ip_address == seen.user_ip_address
            },
            ReplayLevel::Full => same_code(),
        }
    }
}
