//! The replay manager: the replay list plus its three background loops.
//!
//! - **cleanup**: every `cleanup_interval`, purge expired records
//! - **payload refresh**: every `payload.refresh_interval`, download the
//!   signed payload blob and reload the configuration when it is newer
//! - **threat refresh**: same cycle for the threat list, gated by the farm
//!   behaviour level, refreshing management data when it is newer
//!
//! Each concern has its own lock. A refresh holds its feed lock across the
//! download and the cache write, but never touches the replay-list lock, so
//! request-path checks are not blocked by network I/O.

use crate::cache::{FeedCache, FeedMetadata};
use crate::config::ReplayConfig;
use crate::error::Result;
use crate::event_ids;
use crate::feed::{BlobPayloadInformation, FeedDocument, FeedKind, FeedSource, ThreatInformation};
use crate::notify::Notifier;
use crate::record::ReplayRecord;
use crate::set::ReplaySet;
use farm_mfa_core::environment::Clock;
use farm_mfa_runtime::metrics::FeedMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;

/// Result of one feed refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No URL configured, or gated off by the behaviour level.
    Disabled,
    /// The administrator suspended downloads for this feed.
    DownloadDisabled,
    /// The cached next-update time has not been reached.
    NotDue,
    /// The fetched version is not newer; the cache was left untouched.
    Unchanged {
        /// Fetched version number
        number: u64,
    },
    /// The cache was replaced and the notification sent.
    Updated {
        /// New version number
        number: u64,
    },
}

struct Shared<S, C, N> {
    config: Arc<ReplayConfig>,
    records: ReplaySet,
    source: S,
    cache: C,
    notifier: N,
    clock: Arc<dyn Clock>,
    payload: AsyncMutex<Option<BlobPayloadInformation>>,
    threat: AsyncMutex<Option<ThreatInformation>>,
}

trait FeedSlot<D> {
    fn slot(&self) -> &AsyncMutex<Option<D>>;
}

impl<S, C, N> FeedSlot<BlobPayloadInformation> for Shared<S, C, N> {
    fn slot(&self) -> &AsyncMutex<Option<BlobPayloadInformation>> {
        &self.payload
    }
}

impl<S, C, N> FeedSlot<ThreatInformation> for Shared<S, C, N> {
    fn slot(&self) -> &AsyncMutex<Option<ThreatInformation>> {
        &self.threat
    }
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

/// Owns the replay list, the feed caches and the background loops.
///
/// `start` and `close` are idempotent. `close` only signals the loops and
/// returns immediately; the loops observe the signal at their next wait.
/// Call [`ReplayManager::drain`] to wait for them.
pub struct ReplayManager<S, C, N> {
    shared: Arc<Shared<S, C, N>>,
    started: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl<S, C, N> ReplayManager<S, C, N>
where
    S: FeedSource + 'static,
    C: FeedCache + 'static,
    N: Notifier + 'static,
{
    /// Create a stopped manager with an empty replay list.
    pub fn new(
        config: Arc<ReplayConfig>,
        source: S,
        cache: C,
        notifier: N,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                records: ReplaySet::new(),
                source,
                cache,
                notifier,
                clock,
                payload: AsyncMutex::new(None),
                threat: AsyncMutex::new(None),
            }),
            started: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Check and record one attempt. See [`ReplaySet::add_to_replay`].
    pub fn add_to_replay(&self, record: ReplayRecord) -> bool {
        self.shared.records.add_to_replay(record)
    }

    /// Empty the replay list.
    pub fn reset(&self) -> usize {
        self.shared.records.reset()
    }

    /// Run one cleanup pass now.
    pub fn purge_expired(&self) -> usize {
        self.shared.records.purge_expired(self.shared.clock.now())
    }

    /// Handle to the replay list shared with the farm service.
    #[must_use]
    pub fn records(&self) -> ReplaySet {
        self.shared.records.clone()
    }

    /// Whether the loops are running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Spawn the three loops on the current Tokio runtime.
    ///
    /// Returns `false` when already started or when called outside a runtime.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.started.load(Ordering::Acquire) {
            tracing::debug!("Replay manager already started");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(
                event_id = event_ids::MANAGER_START_FAILED,
                "Replay manager needs a Tokio runtime to start"
            );
            return false;
        }

        let (shutdown, rx) = watch::channel(false);
        lifecycle.handles.extend([
            tokio::spawn(cleanup_loop(Arc::clone(&self.shared), rx.clone())),
            tokio::spawn(feed_loop::<BlobPayloadInformation, S, C, N>(
                Arc::clone(&self.shared),
                rx.clone(),
            )),
            tokio::spawn(feed_loop::<ThreatInformation, S, C, N>(Arc::clone(&self.shared), rx)),
        ]);
        lifecycle.shutdown = Some(shutdown);
        self.started.store(true, Ordering::Release);
        drop(lifecycle);

        tracing::info!("Replay manager started");
        true
    }

    /// Signal the loops to stop without waiting for them.
    ///
    /// Returns `false` when the manager was not started.
    pub fn close(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.started.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(shutdown) = lifecycle.shutdown.take() {
            // A send error only means every loop already exited.
            let _ = shutdown.send(true);
        }
        drop(lifecycle);

        tracing::info!("Replay manager closing");
        true
    }

    /// Wait until every loop spawned so far has exited.
    ///
    /// Only returns once [`ReplayManager::close`] has been called (or the
    /// manager dropped); the loops otherwise run forever.
    pub async fn drain(&self) {
        let handles = std::mem::take(
            &mut self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner).handles,
        );
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(event_id = event_ids::LOOP_PANICKED, error = %e, "Background loop ended abnormally");
            }
        }
    }

    /// Run one payload refresh cycle now.
    ///
    /// # Errors
    ///
    /// Returns the download, parse or cache error; the cache is untouched.
    pub async fn refresh_payload_now(&self) -> Result<RefreshOutcome> {
        refresh_cycle::<BlobPayloadInformation, S, C, N>(&self.shared).await
    }

    /// Run one threat refresh cycle now.
    ///
    /// # Errors
    ///
    /// Returns the download, parse or cache error; the cache is untouched.
    pub async fn refresh_threat_now(&self) -> Result<RefreshOutcome> {
        refresh_cycle::<ThreatInformation, S, C, N>(&self.shared).await
    }

    /// Last payload blob loaded by a refresh cycle.
    pub async fn payload_information(&self) -> Option<BlobPayloadInformation> {
        self.shared.payload.lock().await.clone()
    }

    /// Last threat list loaded by a refresh cycle.
    pub async fn threat_information(&self) -> Option<ThreatInformation> {
        self.shared.threat.lock().await.clone()
    }
}

impl<S, C, N> Drop for ReplayManager<S, C, N> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

/// Sleep for `period`; `false` if shutdown was signalled before or during the wait.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        () = tokio::time::sleep(period) => {},
        changed = shutdown.changed() => {
            if changed.is_err() {
                return false;
            }
        },
    }
    !*shutdown.borrow()
}

async fn cleanup_loop<S, C, N>(shared: Arc<Shared<S, C, N>>, mut shutdown: watch::Receiver<bool>) {
    let interval = shared.config.cleanup_interval;
    tracing::info!(?interval, "Replay cleanup loop started");
    while wait_or_shutdown(&mut shutdown, interval).await {
        shared.records.purge_expired(shared.clock.now());
    }
    tracing::info!("Replay cleanup loop stopped");
}

async fn feed_loop<D, S, C, N>(shared: Arc<Shared<S, C, N>>, mut shutdown: watch::Receiver<bool>)
where
    D: FeedDocument,
    S: FeedSource,
    C: FeedCache,
    N: Notifier,
    Shared<S, C, N>: FeedSlot<D>,
{
    let feed = D::FEED;
    let interval = shared.config.feed(feed).refresh_interval;
    let mut immediate = !shared.cache.body_exists(feed).await;
    tracing::info!(%feed, ?interval, immediate, "Feed refresh loop started");

    loop {
        if !immediate && !wait_or_shutdown(&mut shutdown, interval).await {
            break;
        }
        immediate = false;
        if *shutdown.borrow() {
            break;
        }

        match refresh_cycle::<D, S, C, N>(&shared).await {
            Ok(outcome) => tracing::debug!(%feed, ?outcome, "Feed refresh cycle finished"),
            Err(e) => {
                FeedMetrics::record_failure(feed.as_str());
                tracing::error!(
                    event_id = event_ids::FEED_REFRESH_FAILED,
                    %feed,
                    error = %e,
                    "Feed refresh failed; keeping the cached version"
                );
            },
        }
    }
    tracing::info!(%feed, "Feed refresh loop stopped");
}

async fn load_cached<D: FeedDocument, C: FeedCache>(cache: &C) -> Option<D> {
    match cache.load_body(D::FEED).await {
        Ok(Some(body)) => match D::parse(&body) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(event_id = event_ids::FEED_CACHE_UNREADABLE, feed = %D::FEED, error = %e, "Cached feed is unreadable");
                None
            },
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(event_id = event_ids::FEED_CACHE_UNREADABLE, feed = %D::FEED, error = %e, "Cached feed could not be loaded");
            None
        },
    }
}

async fn refresh_cycle<D, S, C, N>(shared: &Shared<S, C, N>) -> Result<RefreshOutcome>
where
    D: FeedDocument,
    S: FeedSource,
    C: FeedCache,
    N: Notifier,
    Shared<S, C, N>: FeedSlot<D>,
{
    let feed = D::FEED;
    let url = match shared.config.feed(feed).url.as_deref() {
        Some(url) if shared.config.feed_enabled(feed) => url,
        _ => return Ok(RefreshOutcome::Disabled),
    };

    let mut current = FeedSlot::<D>::slot(shared).lock().await;

    let exists = shared.cache.body_exists(feed).await;
    let metadata = match shared.cache.metadata(feed).await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(event_id = event_ids::FEED_CACHE_UNREADABLE, %feed, error = %e, "Feed metadata unreadable; treating as absent");
            None
        },
    };

    if exists {
        if let Some(meta) = &metadata {
            if !meta.download_allowed {
                return Ok(RefreshOutcome::DownloadDisabled);
            }
            if meta.next_update > shared.clock.now() {
                if current.is_none() {
                    *current = load_cached::<D, C>(&shared.cache).await;
                }
                return Ok(RefreshOutcome::NotDue);
            }
        }
    }

    let raw = shared.source.fetch(feed, url).await?;
    let document = D::parse(&raw)?;
    let number = document.number();

    let newer = !exists
        || metadata
            .as_ref()
            .is_none_or(|meta| meta.is_superseded_by(number, document.next_update()));
    if !newer {
        tracing::debug!(%feed, number, "Fetched feed is not newer than the cache");
        if current.is_none() {
            *current = Some(document);
        }
        return Ok(RefreshOutcome::Unchanged { number });
    }

    let new_metadata = FeedMetadata {
        number,
        next_update: document.next_update(),
        download_allowed: true,
    };
    shared.cache.store(feed, &new_metadata, document.raw()).await?;
    *current = Some(document);
    drop(current);

    FeedMetrics::record_refreshed(feed.as_str());
    tracing::info!(%feed, number, next_update = %new_metadata.next_update, "Feed cache updated");

    let notified = match feed {
        FeedKind::Payload => shared.notifier.reload_configuration().await,
        FeedKind::Threat => shared.notifier.refresh_management_data().await,
    };
    if let Err(e) = notified {
        tracing::error!(event_id = event_ids::NOTIFICATION_FAILED, %feed, error = %e, "Feed update notification failed");
    }

    Ok(RefreshOutcome::Updated { number })
}
