//! Replay manager configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::feed::FeedKind;

/// Lowest farm behaviour level at which the threat feed is fetched.
pub const THREAT_FEED_MIN_BEHAVIOR_LEVEL: u32 = 3;

/// One remote feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Download URL; `None` disables the feed.
    pub url: Option<String>,
    /// Interval between refresh cycles (default: 12 hours)
    pub refresh_interval: Duration,
    /// HTTP timeout for one download (default: 30 seconds)
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            refresh_interval: Duration::from_secs(12 * 60 * 60),
            timeout: Duration::from_secs(30),
        }
    }
}

impl FeedConfig {
    /// Feed downloaded from `url` with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set the refresh interval.
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the download timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration shared by the replay list and the background loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Interval between cleanup passes (default: 60 seconds)
    pub cleanup_interval: Duration,
    /// Signed payload blob feed
    pub payload: FeedConfig,
    /// Line-oriented threat feed
    pub threat: FeedConfig,
    /// Farm behaviour level; gates the threat feed
    pub behavior_level: u32,
    /// Directory holding feed caches
    pub cache_dir: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60),
            payload: FeedConfig::default(),
            threat: FeedConfig::default(),
            behavior_level: 1,
            cache_dir: std::env::temp_dir().join("farm-mfa"),
        }
    }
}

impl ReplayConfig {
    /// Configuration caching feeds under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Set the cleanup interval.
    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the payload feed.
    #[must_use]
    pub fn with_payload_feed(mut self, feed: FeedConfig) -> Self {
        self.payload = feed;
        self
    }

    /// Set the threat feed.
    #[must_use]
    pub fn with_threat_feed(mut self, feed: FeedConfig) -> Self {
        self.threat = feed;
        self
    }

    /// Set the farm behaviour level.
    #[must_use]
    pub const fn with_behavior_level(mut self, level: u32) -> Self {
        self.behavior_level = level;
        self
    }

    /// Settings of one feed.
    #[must_use]
    pub const fn feed(&self, kind: FeedKind) -> &FeedConfig {
        match kind {
            FeedKind::Payload => &self.payload,
            FeedKind::Threat => &self.threat,
        }
    }

    /// Whether a feed should be fetched at all.
    #[must_use]
    pub const fn feed_enabled(&self, kind: FeedKind) -> bool {
        let configured = self.feed(kind).url.is_some();
        match kind {
            FeedKind::Payload => configured,
            FeedKind::Threat => {
                configured && self.behavior_level >= THREAT_FEED_MIN_BEHAVIOR_LEVEL
            },
        }
    }
}
