//! Remote feeds refreshed by the replay manager.

use crate::error::{ReplayError, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;

mod payload;
mod threat;

pub use payload::BlobPayloadInformation;
pub use threat::ThreatInformation;

/// The two feeds kept in the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Signed payload blob; a newer version reloads the configuration.
    Payload,
    /// Threat list; a newer version refreshes management data.
    Threat,
}

impl FeedKind {
    /// Stable name used for cache files, logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payload => "payload",
            Self::Threat => "threat",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed feed body keyed by (version number, next update).
pub trait FeedDocument: Clone + Send + Sync + Sized + 'static {
    /// Which feed this document belongs to.
    const FEED: FeedKind;

    /// Parse a downloaded or cached body.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidFeed`] when the body is malformed.
    fn parse(raw: &str) -> Result<Self>;

    /// Monotonic version number.
    fn number(&self) -> u64;

    /// When the publisher plans the next version.
    fn next_update(&self) -> DateTime<Utc>;

    /// The body exactly as downloaded.
    fn raw(&self) -> &str;
}

/// Downloads feed bodies.
pub trait FeedSource: Send + Sync {
    /// Fetch the body of `feed` from `url`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    fn fetch(&self, feed: FeedKind, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// [`FeedSource`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    /// Create a source with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Http`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("farm-mfa/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: FeedKind, url: &str) -> Result<String> {
        tracing::debug!(%feed, url, "Downloading feed");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReplayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Parse either a plain `YYYY-MM-DD` date (midnight UTC) or an RFC 3339 timestamp.
pub(crate) fn parse_update_time(feed: FeedKind, value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReplayError::InvalidFeed {
            feed: feed.as_str(),
            reason: format!("bad update time {value:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_time_accepts_dates_and_timestamps() {
        let date = parse_update_time(FeedKind::Payload, "2026-11-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2026-11-01T00:00:00+00:00");

        let ts = parse_update_time(FeedKind::Threat, "2026-11-01T06:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-11-01T06:30:00+00:00");

        assert!(parse_update_time(FeedKind::Threat, "soon").is_err());
    }
}
