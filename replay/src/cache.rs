//! Local persistence of feed bodies and their metadata.

use crate::error::Result;
use crate::feed::FeedKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What the cache knows about the stored version of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMetadata {
    /// Stored version number
    pub number: u64,
    /// Stored next-update timestamp
    pub next_update: DateTime<Utc>,
    /// Administrator switch; `false` suspends downloads
    pub download_allowed: bool,
}

impl FeedMetadata {
    /// Whether a fetched version with this `number`/`next_update` must replace the stored one.
    #[must_use]
    pub fn is_superseded_by(&self, number: u64, next_update: DateTime<Utc>) -> bool {
        number > self.number || next_update > self.next_update
    }
}

/// Storage for feed bodies (cache file) and metadata (registry fields).
pub trait FeedCache: Send + Sync {
    /// Whether a body is stored for `feed`.
    fn body_exists(&self, feed: FeedKind) -> impl Future<Output = bool> + Send;

    /// Stored metadata, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata exists but cannot be read.
    fn metadata(&self, feed: FeedKind) -> impl Future<Output = Result<Option<FeedMetadata>>> + Send;

    /// Stored body, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the body exists but cannot be read.
    fn load_body(&self, feed: FeedKind) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replace the stored body and metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    fn store(
        &self,
        feed: FeedKind,
        metadata: &FeedMetadata,
        body: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`FeedCache`] in a directory.
///
/// `<dir>/<feed>.cache` holds the body verbatim and `<dir>/<feed>.meta.json`
/// the metadata. Both are written to a temporary file first and renamed.
#[derive(Debug, Clone)]
pub struct FileFeedCache {
    dir: PathBuf,
}

impl FileFeedCache {
    /// Cache rooted at `dir` (created on first write).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the body file for `feed`.
    #[must_use]
    pub fn body_path(&self, feed: FeedKind) -> PathBuf {
        self.dir.join(format!("{feed}.cache"))
    }

    /// Path of the metadata file for `feed`.
    #[must_use]
    pub fn metadata_path(&self, feed: FeedKind) -> PathBuf {
        self.dir.join(format!("{feed}.meta.json"))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = stage(path, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Write `bytes` next to `path`, ready to be renamed over it.
async fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    Ok(tmp)
}

impl FeedCache for FileFeedCache {
    async fn body_exists(&self, feed: FeedKind) -> bool {
        tokio::fs::try_exists(self.body_path(feed)).await.unwrap_or(false)
    }

    async fn metadata(&self, feed: FeedKind) -> Result<Option<FeedMetadata>> {
        match read_optional(&self.metadata_path(feed)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn load_body(&self, feed: FeedKind) -> Result<Option<String>> {
        read_optional(&self.body_path(feed)).await
    }

    async fn store(&self, feed: FeedKind, metadata: &FeedMetadata, body: &str) -> Result<()> {
        // Both files are staged before either replaces the cached pair
        let (body_path, metadata_path) = (self.body_path(feed), self.metadata_path(feed));
        let metadata_tmp = stage(&metadata_path, &serde_json::to_vec_pretty(metadata)?).await?;
        let body_tmp = stage(&body_path, body.as_bytes()).await?;
        tokio::fs::rename(&body_tmp, &body_path).await?;
        tokio::fs::rename(&metadata_tmp, &metadata_path).await?;
        tracing::debug!(%feed, number = metadata.number, dir = %self.dir.display(), "Feed cache written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use farm_mfa_core::environment::Clock;
    use farm_mfa_testing::test_clock;

    #[test]
    fn supersession_requires_strictly_newer_data() {
        let now = test_clock().now();
        let meta = FeedMetadata { number: 5, next_update: now, download_allowed: true };
        assert!(!meta.is_superseded_by(5, now));
        assert!(!meta.is_superseded_by(4, now));
        assert!(meta.is_superseded_by(6, now));
        assert!(meta.is_superseded_by(5, now + Duration::days(1)));
    }

    #[tokio::test]
    async fn file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileFeedCache::new(dir.path().join("nested"));
        let meta = FeedMetadata { number: 3, next_update: test_clock().now(), download_allowed: false };

        assert!(!cache.body_exists(FeedKind::Threat).await);
        assert_eq!(cache.metadata(FeedKind::Threat).await.unwrap(), None);

        cache.store(FeedKind::Threat, &meta, "# version: 3\n").await.unwrap();

        assert!(cache.body_exists(FeedKind::Threat).await);
        assert!(!cache.body_exists(FeedKind::Payload).await);
        assert_eq!(cache.metadata(FeedKind::Threat).await.unwrap(), Some(meta));
        assert_eq!(cache.load_body(FeedKind::Threat).await.unwrap().as_deref(), Some("# version: 3\n"));
    }

    #[tokio::test]
    async fn failed_store_keeps_the_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileFeedCache::new(dir.path());
        let old = FeedMetadata { number: 1, next_update: test_clock().now(), download_allowed: true };
        cache.store(FeedKind::Payload, &old, "v1").await.unwrap();

        // A directory where the metadata is staged makes the write fail
        tokio::fs::create_dir(cache.metadata_path(FeedKind::Payload).with_extension("tmp"))
            .await
            .unwrap();
        let new = FeedMetadata { number: 2, ..old.clone() };
        assert!(cache.store(FeedKind::Payload, &new, "v2").await.is_err());

        assert_eq!(cache.load_body(FeedKind::Payload).await.unwrap().as_deref(), Some("v1"));
        assert_eq!(cache.metadata(FeedKind::Payload).await.unwrap(), Some(old));
    }
}
