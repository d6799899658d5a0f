//! Replay check of submitted codes.
//!
//! Three guards cover the deployments the adapter runs in: a standalone
//! node checks its own [`ReplaySet`], a node hosting the farm service checks
//! through [`ReplayService`] (which relays to peers), and a node without the
//! service asks the local service over HTTP through a [`PeerClient`].

use crate::error::Result;
use farm_mfa_replay::wire::CheckRequest;
use farm_mfa_replay::{Notifier, PeerClient, ReplayRecord, ReplayService, ReplaySet};
use std::future::Future;
use std::sync::Arc;

/// Accepts a code once per replay window.
pub trait ReplayGuard: Send + Sync {
    /// `true` when the record is novel, `false` for a replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the check could not be performed.
    fn check(&self, record: ReplayRecord) -> impl Future<Output = Result<bool>> + Send;
}

impl ReplayGuard for ReplaySet {
    async fn check(&self, record: ReplayRecord) -> Result<bool> {
        Ok(self.add_to_replay(record))
    }
}

/// Guard checking through an in-process farm service.
#[derive(Debug)]
pub struct FarmReplayGuard<P, N> {
    service: Arc<ReplayService<P, N>>,
    servers: Arc<[String]>,
}

impl<P, N> Clone for FarmReplayGuard<P, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            servers: Arc::clone(&self.servers),
        }
    }
}

impl<P, N> FarmReplayGuard<P, N> {
    /// Guard relaying through `service` to `servers`.
    pub fn new(service: Arc<ReplayService<P, N>>, servers: impl Into<Arc<[String]>>) -> Self {
        Self {
            service,
            servers: servers.into(),
        }
    }
}

impl<P, N> ReplayGuard for FarmReplayGuard<P, N>
where
    P: PeerClient,
    N: Notifier,
{
    async fn check(&self, record: ReplayRecord) -> Result<bool> {
        Ok(self.service.check(&self.servers, record).await)
    }
}

/// Guard asking a farm service node over its wire protocol.
#[derive(Debug, Clone)]
pub struct PeerReplayGuard<P> {
    peers: P,
    node: String,
    servers: Vec<String>,
}

impl<P: PeerClient> PeerReplayGuard<P> {
    /// Guard asking `node`, which relays to `servers`.
    pub fn new(peers: P, node: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            peers,
            node: node.into(),
            servers,
        }
    }
}

impl<P: PeerClient> ReplayGuard for PeerReplayGuard<P> {
    async fn check(&self, record: ReplayRecord) -> Result<bool> {
        let request = CheckRequest {
            servers: self.servers.clone(),
            record,
        };
        Ok(self.peers.check(&self.node, &request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use farm_mfa_replay::ReplayLevel;
    use farm_mfa_replay::mocks::{MockPeerClient, PeerBehavior, PeerCall, RecordingNotifier};

    fn record() -> ReplayRecord {
        ReplayRecord::new(
            "bob@contoso.com",
            "654321",
            "10.0.0.7".parse().unwrap(),
            Utc::now(),
            300,
            ReplayLevel::Full,
        )
    }

    #[tokio::test]
    async fn local_set_rejects_second_use() {
        let set = ReplaySet::new();
        assert!(set.check(record()).await.unwrap());
        assert!(!set.check(record()).await.unwrap());
    }

    #[tokio::test]
    async fn farm_guard_relays_to_peers() {
        let peers = MockPeerClient::new();
        let service = ReplayService::new("adfs1", ReplaySet::new(), peers.clone(), RecordingNotifier::new());
        let guard = FarmReplayGuard::new(Arc::new(service), vec!["adfs1".to_string(), "adfs2".to_string()]);

        assert!(guard.check(record()).await.unwrap());
        assert!(matches!(peers.calls().as_slice(), [PeerCall::Check(server, _)] if server == "adfs2"));
    }

    #[tokio::test]
    async fn peer_guard_surfaces_transport_errors() {
        let peers = MockPeerClient::new().with_peer("localhost", PeerBehavior::Unreachable);
        let guard = PeerReplayGuard::new(peers, "localhost", vec!["adfs1".to_string()]);

        assert!(guard.check(record()).await.is_err());
    }
}
