//! Cross-node replay checks and notification fan-out.
//!
//! A check arriving with `must_dispatch` is recorded locally and relayed to
//! every other farm member with the flag cleared, so relays stop after one
//! hop. Peers are called concurrently. A peer that rejects the code rejects
//! it for the whole farm; a peer that cannot be reached is logged and
//! ignored. Broadcasts carry no acknowledgement or ordering guarantee.

use crate::error::Result;
use crate::event_ids;
use crate::notify::{FarmNotification, Notifier};
use crate::record::ReplayRecord;
use crate::set::ReplaySet;
use crate::wire::{CheckRequest, ResetRequest};
use farm_mfa_runtime::metrics::FarmMetrics;
use futures::future::join_all;
use std::future::Future;

/// Calls made to another farm node.
pub trait PeerClient: Send + Sync {
    /// Ask `server` to check a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached or answers garbage.
    fn check(&self, server: &str, request: &CheckRequest) -> impl Future<Output = Result<bool>> + Send;

    /// Ask `server` to empty its replay list.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached.
    fn reset(&self, server: &str, request: &ResetRequest) -> impl Future<Output = Result<()>> + Send;

    /// Probe `server`.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached.
    fn warm_up(&self, server: &str) -> impl Future<Output = Result<()>> + Send;

    /// Deliver a notification to `server`.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached.
    fn notify(
        &self,
        server: &str,
        notification: FarmNotification,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Per-peer result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers that acknowledged the call
    pub delivered: Vec<String>,
    /// Peers that could not be reached, with the reason
    pub failed: Vec<(String, String)>,
}

/// The replay endpoint of one farm node.
#[derive(Debug, Clone)]
pub struct ReplayService<P, N> {
    node: String,
    records: ReplaySet,
    peers: P,
    notifier: N,
}

impl<P, N> ReplayService<P, N>
where
    P: PeerClient,
    N: Notifier,
{
    /// Endpoint for `node` backed by `records`.
    pub fn new(node: impl Into<String>, records: ReplaySet, peers: P, notifier: N) -> Self {
        Self {
            node: node.into(),
            records,
            peers,
            notifier,
        }
    }

    /// Name of this node.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The local replay list.
    #[must_use]
    pub const fn records(&self) -> &ReplaySet {
        &self.records
    }

    fn is_local(&self, server: &str) -> bool {
        server.eq_ignore_ascii_case(&self.node)
    }

    fn others<'a>(&'a self, servers: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
        servers.iter().filter(|server| !self.is_local(server))
    }

    /// Check a record here and, when `must_dispatch` is set, on every other node.
    ///
    /// Relaying only happens when the local check accepted the code.
    #[tracing::instrument(skip(self, servers, record), fields(user = %record.user_name, dispatch = record.must_dispatch))]
    pub async fn check(&self, servers: &[String], record: ReplayRecord) -> bool {
        let must_dispatch = record.must_dispatch;
        let relayed = ReplayRecord {
            must_dispatch: false,
            ..record.clone()
        };

        if !self.records.add_to_replay(record) {
            return false;
        }
        if !must_dispatch {
            return true;
        }

        let request = CheckRequest {
            servers: servers.to_vec(),
            record: relayed,
        };
        let calls = self.others(servers).map(|server| {
            let request = &request;
            async move { (server, self.peers.check(server, request).await) }
        });

        let mut accepted = true;
        for (server, result) in join_all(calls).await {
            match result {
                Ok(true) => {},
                Ok(false) => {
                    tracing::warn!(server = %server, "Peer rejected replayed code");
                    accepted = false;
                },
                Err(e) => {
                    FarmMetrics::record_peer_failure("check");
                    tracing::warn!(
                        event_id = event_ids::PEER_CALL_FAILED,
                        server = %server,
                        error = %e,
                        "Peer replay check failed; ignoring peer"
                    );
                },
            }
        }
        accepted
    }

    /// Empty the local list and, when `must_dispatch`, every other node's list.
    pub async fn reset(&self, servers: &[String], must_dispatch: bool) -> BroadcastReport {
        self.records.reset();
        if !must_dispatch {
            return BroadcastReport::default();
        }

        let request = ResetRequest {
            servers: servers.to_vec(),
            must_dispatch: false,
        };
        let calls = self.others(servers).map(|server| {
            let request = &request;
            async move { (server, self.peers.reset(server, request).await) }
        });
        collect_report("reset", join_all(calls).await)
    }

    /// Connectivity probe; does nothing.
    pub fn warm_up(&self) {
        tracing::trace!(node = %self.node, "Warm-up probe");
    }

    /// Apply a notification to this node only.
    ///
    /// # Errors
    ///
    /// Returns the local notifier's error.
    pub async fn notify_local(&self, notification: FarmNotification) -> Result<()> {
        tracing::info!(?notification, node = %self.node, "Applying notification");
        match notification {
            FarmNotification::ReloadConfiguration => self.notifier.reload_configuration().await,
            FarmNotification::RefreshManagementData => self.notifier.refresh_management_data().await,
            FarmNotification::ResetReplay => {
                self.records.reset();
                Ok(())
            },
        }
    }

    /// Apply a notification here and send it to every other node.
    pub async fn broadcast(&self, servers: &[String], notification: FarmNotification) -> BroadcastReport {
        if let Err(e) = self.notify_local(notification).await {
            tracing::error!(
                event_id = event_ids::NOTIFICATION_FAILED,
                ?notification,
                error = %e,
                "Local notification failed"
            );
        }

        let calls = self.others(servers).map(|server| async move {
            (server, self.peers.notify(server, notification).await)
        });
        collect_report("notify", join_all(calls).await)
    }

    /// Probe every other node.
    pub async fn warm_up_farm(&self, servers: &[String]) -> BroadcastReport {
        let calls = self
            .others(servers)
            .map(|server| async move { (server, self.peers.warm_up(server).await) });
        collect_report("warm_up", join_all(calls).await)
    }
}

fn collect_report(operation: &'static str, results: Vec<(&String, Result<()>)>) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for (server, result) in results {
        match result {
            Ok(()) => report.delivered.push(server.clone()),
            Err(e) => {
                FarmMetrics::record_peer_failure(operation);
                tracing::warn!(
                    event_id = event_ids::PEER_CALL_FAILED,
                    operation,
                    server = %server,
                    error = %e,
                    "Peer call failed"
                );
                report.failed.push((server.clone(), e.to_string()));
            },
        }
    }
    report
}
