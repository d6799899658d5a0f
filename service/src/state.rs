//! State shared by every handler.

use crate::error::AppError;
use crate::event_ids;
use farm_mfa_replay::{EncryptedCache, Notifier, PeerClient, ReplayService};
use farm_mfa_runtime::metrics::MetricsServer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Security data kept encrypted on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetadata {
    /// Account the adapter runs under
    pub service_account_sid: Option<String>,
    /// Callers allowed on `/admin/*`
    pub admin_sids: Vec<String>,
    /// Farm membership; overrides the configured list when not empty
    pub servers: Vec<String>,
}

impl SecurityMetadata {
    /// Whether `sid` may call the administration routes.
    #[must_use]
    pub fn is_administrator(&self, sid: &str) -> bool {
        self.admin_sids.iter().any(|admin| admin.eq_ignore_ascii_case(sid))
    }
}

/// Write `seed` to `cache` unless it already holds metadata.
///
/// Returns `true` when the seed was written.
///
/// # Errors
///
/// Returns the cache error; an undecryptable file is never overwritten.
pub async fn provision_security(cache: &EncryptedCache, seed: &SecurityMetadata) -> Result<bool, AppError> {
    if cache.load::<SecurityMetadata>().await?.is_some() {
        return Ok(false);
    }
    cache.store(seed).await?;
    tracing::info!(path = %cache.path().display(), admins = seed.admin_sids.len(), "Security metadata provisioned");
    Ok(true)
}

/// Handler state: the node's replay endpoint plus farm metadata.
pub struct AppState<P, N> {
    replay: ReplayService<P, N>,
    servers: Vec<String>,
    security: Option<EncryptedCache>,
    metrics: Option<Arc<MetricsServer>>,
}

impl<P, N> AppState<P, N>
where
    P: PeerClient,
    N: Notifier,
{
    /// State serving `replay` for a farm of `servers`.
    pub const fn new(replay: ReplayService<P, N>, servers: Vec<String>) -> Self {
        Self {
            replay,
            servers,
            security: None,
            metrics: None,
        }
    }

    /// Enable the administration routes.
    #[must_use]
    pub fn with_security(mut self, cache: EncryptedCache) -> Self {
        self.security = Some(cache);
        self
    }

    /// Serve `/metrics` from `server`.
    #[must_use]
    pub fn with_metrics(mut self, server: Arc<MetricsServer>) -> Self {
        self.metrics = Some(server);
        self
    }

    /// The replay endpoint.
    pub const fn replay(&self) -> &ReplayService<P, N> {
        &self.replay
    }

    /// Rendered Prometheus metrics, if a recorder is installed.
    pub fn render_metrics(&self) -> Option<String> {
        self.metrics.as_ref().and_then(|server| server.render())
    }

    /// Decrypted security metadata.
    ///
    /// # Errors
    ///
    /// 503 when no cache is configured or nothing was provisioned yet, 500
    /// when the file cannot be decrypted.
    pub async fn security_metadata(&self) -> Result<SecurityMetadata, AppError> {
        let cache = self
            .security
            .as_ref()
            .ok_or_else(|| AppError::unavailable("Security metadata is not configured"))?;
        cache
            .load::<SecurityMetadata>()
            .await?
            .ok_or_else(|| AppError::unavailable("Security metadata has not been provisioned"))
    }

    /// Current farm membership.
    ///
    /// The encrypted metadata wins when it lists servers; otherwise, or when
    /// it cannot be read, the configured list is used.
    pub async fn servers(&self) -> Vec<String> {
        if self.security.is_some() {
            match self.security_metadata().await {
                Ok(metadata) if !metadata.servers.is_empty() => return metadata.servers,
                Ok(_) => {},
                Err(e) => tracing::warn!(
                    event_id = event_ids::SECURITY_METADATA_UNREADABLE,
                    error = %e,
                    "Falling back to the configured farm list"
                ),
            }
        }
        self.servers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_mfa_replay::ReplaySet;
    use farm_mfa_replay::mocks::{MockPeerClient, RecordingNotifier};

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    fn state() -> AppState<MockPeerClient, RecordingNotifier> {
        let replay = ReplayService::new("adfs1", ReplaySet::new(), MockPeerClient::new(), RecordingNotifier::new());
        AppState::new(replay, vec!["adfs1".into(), "adfs2".into()])
    }

    #[test]
    fn administrators_match_case_insensitively() {
        let metadata = SecurityMetadata {
            admin_sids: vec!["S-1-5-21-100-512".into()],
            ..SecurityMetadata::default()
        };
        assert!(metadata.is_administrator("s-1-5-21-100-512"));
        assert!(!metadata.is_administrator("S-1-5-21-100-513"));
    }

    #[tokio::test]
    async fn provisioning_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EncryptedCache::new(dir.path().join("security.bin"), &key()).unwrap();
        let first = SecurityMetadata {
            admin_sids: vec!["S-1-5-32-544".into()],
            ..SecurityMetadata::default()
        };

        assert!(provision_security(&cache, &first).await.unwrap());
        assert!(!provision_security(&cache, &SecurityMetadata::default()).await.unwrap());
        assert_eq!(cache.load::<SecurityMetadata>().await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn configured_servers_are_used_without_metadata() {
        assert_eq!(state().servers().await, vec!["adfs1", "adfs2"]);
    }

    #[tokio::test]
    async fn metadata_servers_override_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EncryptedCache::new(dir.path().join("security.bin"), &key()).unwrap();
        cache
            .store(&SecurityMetadata {
                servers: vec!["adfs1".into(), "adfs3".into()],
                ..SecurityMetadata::default()
            })
            .await
            .unwrap();

        let state = state().with_security(cache);
        assert_eq!(state.servers().await, vec!["adfs1", "adfs3"]);
    }

    #[tokio::test]
    async fn unprovisioned_metadata_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EncryptedCache::new(dir.path().join("security.bin"), &key()).unwrap();
        let state = state().with_security(cache);

        let err = state.security_metadata().await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.servers().await, vec!["adfs1", "adfs2"]);
    }
}
