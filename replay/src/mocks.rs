//! In-memory collaborators for tests.

use crate::cache::{FeedCache, FeedMetadata};
use crate::error::{ReplayError, Result};
use crate::farm::PeerClient;
use crate::feed::{FeedKind, FeedSource};
use crate::notify::{FarmNotification, Notifier};
use crate::wire::{CheckRequest, ResetRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn guard<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Feed source serving fixed bodies.
///
/// A feed without a body fails with a transport-like error.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedSource {
    bodies: Arc<Mutex<HashMap<FeedKind, String>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticFeedSource {
    /// Source with no bodies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `feed` from now on.
    pub fn serve(&self, feed: FeedKind, body: impl Into<String>) {
        guard(&self.bodies).insert(feed, body.into());
    }

    /// Stop serving `feed`.
    pub fn fail(&self, feed: FeedKind) {
        guard(&self.bodies).remove(&feed);
    }

    /// Number of fetches so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FeedSource for StaticFeedSource {
    async fn fetch(&self, feed: FeedKind, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        guard(&self.bodies).get(&feed).cloned().ok_or_else(|| ReplayError::Status {
            url: url.to_string(),
            status: 503,
        })
    }
}

/// Feed cache held in memory, counting writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeedCache {
    entries: Arc<Mutex<HashMap<FeedKind, (FeedMetadata, String)>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryFeedCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache without counting a write.
    pub fn seed(&self, feed: FeedKind, metadata: FeedMetadata, body: impl Into<String>) {
        guard(&self.entries).insert(feed, (metadata, body.into()));
    }

    /// Number of [`FeedCache::store`] calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl FeedCache for MemoryFeedCache {
    async fn body_exists(&self, feed: FeedKind) -> bool {
        guard(&self.entries).contains_key(&feed)
    }

    async fn metadata(&self, feed: FeedKind) -> Result<Option<FeedMetadata>> {
        Ok(guard(&self.entries).get(&feed).map(|(meta, _)| meta.clone()))
    }

    async fn load_body(&self, feed: FeedKind) -> Result<Option<String>> {
        Ok(guard(&self.entries).get(&feed).map(|(_, body)| body.clone()))
    }

    async fn store(&self, feed: FeedKind, metadata: &FeedMetadata, body: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        guard(&self.entries).insert(feed, (metadata.clone(), body.to_string()));
        Ok(())
    }
}

/// Notifier recording what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<FarmNotification>>>,
}

impl RecordingNotifier {
    /// Notifier with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    #[must_use]
    pub fn received(&self) -> Vec<FarmNotification> {
        guard(&self.received).clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn reload_configuration(&self) -> Result<()> {
        guard(&self.received).push(FarmNotification::ReloadConfiguration);
        Ok(())
    }

    async fn refresh_management_data(&self) -> Result<()> {
        guard(&self.received).push(FarmNotification::RefreshManagementData);
        Ok(())
    }
}

/// How a [`MockPeerClient`] peer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Accept every check and acknowledge every call
    Accept,
    /// Reject every check
    Reject,
    /// Fail every call
    Unreachable,
}

/// One call seen by [`MockPeerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    /// A check with the relayed request
    Check(String, CheckRequest),
    /// A reset with the relayed request
    Reset(String, ResetRequest),
    /// A warm-up probe
    WarmUp(String),
    /// A notification
    Notify(String, FarmNotification),
}

/// Scripted peers. Unknown servers accept.
#[derive(Debug, Clone, Default)]
pub struct MockPeerClient {
    behaviors: Arc<Mutex<HashMap<String, PeerBehavior>>>,
    calls: Arc<Mutex<Vec<PeerCall>>>,
}

impl MockPeerClient {
    /// Peers that all accept.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script how `server` answers.
    #[must_use]
    pub fn with_peer(self, server: impl Into<String>, behavior: PeerBehavior) -> Self {
        guard(&self.behaviors).insert(server.into(), behavior);
        self
    }

    /// Calls seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PeerCall> {
        guard(&self.calls).clone()
    }

    fn answer(&self, server: &str, call: PeerCall) -> Result<PeerBehavior> {
        guard(&self.calls).push(call);
        match guard(&self.behaviors).get(server).copied().unwrap_or(PeerBehavior::Accept) {
            PeerBehavior::Unreachable => Err(ReplayError::Status {
                url: server.to_string(),
                status: 502,
            }),
            behavior => Ok(behavior),
        }
    }
}

impl PeerClient for MockPeerClient {
    async fn check(&self, server: &str, request: &CheckRequest) -> Result<bool> {
        let behavior = self.answer(server, PeerCall::Check(server.to_string(), request.clone()))?;
        Ok(behavior == PeerBehavior::Accept)
    }

    async fn reset(&self, server: &str, request: &ResetRequest) -> Result<()> {
        self.answer(server, PeerCall::Reset(server.to_string(), request.clone()))
            .map(|_| ())
    }

    async fn warm_up(&self, server: &str) -> Result<()> {
        self.answer(server, PeerCall::WarmUp(server.to_string())).map(|_| ())
    }

    async fn notify(&self, server: &str, notification: FarmNotification) -> Result<()> {
        self.answer(server, PeerCall::Notify(server.to_string(), notification))
            .map(|_| ())
    }
}
