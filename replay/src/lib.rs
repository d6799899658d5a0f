//! # Farm MFA Replay
//!
//! Replay protection for one-time codes and the background work that keeps a
//! farm node's caches current.
//!
//! - [`ReplaySet`]: the in-memory list of codes seen within their delivery
//!   window, checked synchronously on the authentication path
//! - [`ReplayManager`]: owns the list plus the cleanup, payload refresh and
//!   threat refresh loops
//! - [`ReplayService`]: relays checks, resets and notifications to the other
//!   farm nodes through a [`PeerClient`]
//! - [`EncryptedCache`]: AES-256-GCM protected JSON file for security metadata
//!
//! ## Example
//!
//! ```ignore
//! use farm_mfa_replay::{ReplayManager, ReplayRecord, ReplayLevel};
//!
//! let manager = ReplayManager::new(config, HttpFeedSource::new(timeout)?, FileFeedCache::new(dir), notifier, clock);
//! manager.start();
//!
//! let record = ReplayRecord::new("alice@contoso.com", "123456", ip, logon, 300, ReplayLevel::Full);
//! assert!(manager.add_to_replay(record.clone()));
//! assert!(!manager.add_to_replay(record));
//!
//! manager.close();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod farm;
pub mod feed;
pub mod http;
pub mod manager;
pub mod notify;
pub mod record;
pub mod secure;
pub mod set;
pub mod wire;

#[cfg(feature = "test-utils")]
pub mod mocks;

/// Event-log codes attached as `event_id` to error and warning logs.
pub mod event_ids {
    /// The manager could not spawn its loops.
    pub const MANAGER_START_FAILED: u32 = 1100;
    /// A background loop task panicked.
    pub const LOOP_PANICKED: u32 = 1101;
    /// A feed download, parse or cache write failed.
    pub const FEED_REFRESH_FAILED: u32 = 1201;
    /// A cached feed body or its metadata could not be read.
    pub const FEED_CACHE_UNREADABLE: u32 = 1202;
    /// A local notification could not be delivered.
    pub const NOTIFICATION_FAILED: u32 = 1203;
    /// A farm peer could not be reached.
    pub const PEER_CALL_FAILED: u32 = 1301;
}

pub use cache::{FeedCache, FeedMetadata, FileFeedCache};
pub use config::{FeedConfig, ReplayConfig};
pub use error::{ReplayError, Result};
pub use farm::{BroadcastReport, PeerClient, ReplayService};
pub use feed::{BlobPayloadInformation, FeedDocument, FeedKind, FeedSource, HttpFeedSource, ThreatInformation};
pub use http::HttpPeerClient;
pub use manager::{RefreshOutcome, ReplayManager};
pub use notify::{ChannelNotifier, FarmNotification, Notifier};
pub use record::{ReplayLevel, ReplayRecord};
pub use secure::EncryptedCache;
pub use set::ReplaySet;
