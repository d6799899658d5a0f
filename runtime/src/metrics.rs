//! Prometheus metrics for the adapter, the replay subsystem and the driver.
//!
//! Recording goes through the `metrics` facade, so nothing is exported until
//! a [`MetricsServer`] installs the Prometheus recorder. Libraries can record
//! unconditionally; without a recorder the calls are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use farm_mfa_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9464".parse()?);
//! server.start()?;
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder owner.
///
/// The service exposes [`MetricsServer::render`] on its own `/metrics` route.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for the given advertised address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or installed. A
    /// recorder that is already installed is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Address the metrics are advertised on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Replay cache
    describe_counter!(
        "replay_records_accepted_total",
        "One-time codes accepted as novel by the replay cache"
    );
    describe_counter!(
        "replay_records_rejected_total",
        "One-time codes rejected as replays"
    );
    describe_counter!(
        "replay_cleanup_purged_total",
        "Expired replay records removed by the cleanup loop"
    );
    describe_gauge!("replay_records", "Records currently held by the replay cache");

    // Feed refresh
    describe_counter!(
        "replay_feed_refreshed_total",
        "Feed refresh cycles that replaced the local cache"
    );
    describe_counter!(
        "replay_feed_failed_total",
        "Feed refresh cycles that failed"
    );

    // Farm fan-out
    describe_counter!(
        "farm_peer_failures_total",
        "Peer calls that failed during a farm fan-out"
    );

    // Adapter
    describe_counter!(
        "adapter_authentications_completed_total",
        "Authentications that completed with claims"
    );
    describe_counter!("adapter_lockouts_total", "Sessions sent to the locking path");

    // Driver
    describe_counter!(
        "driver_actions_processed_total",
        "Actions reduced by the request driver"
    );
    describe_counter!(
        "driver_step_limit_total",
        "Requests aborted because the reducer did not settle"
    );
    describe_histogram!(
        "driver_reduce_duration_seconds",
        "Time spent inside a single reduction"
    );
}

/// Replay cache metrics recorder.
pub struct ReplayMetrics;

impl ReplayMetrics {
    /// Record the outcome of a replay check.
    pub fn record_check(accepted: bool) {
        if accepted {
            counter!("replay_records_accepted_total").increment(1);
        } else {
            counter!("replay_records_rejected_total").increment(1);
        }
    }

    /// Record how many records the list holds.
    #[allow(clippy::cast_precision_loss)] // record counts stay far below 2^52
    pub fn record_size(held: usize) {
        gauge!("replay_records").set(held as f64);
    }

    /// Record a cleanup pass.
    pub fn record_cleanup(purged: usize, remaining: usize) {
        counter!("replay_cleanup_purged_total").increment(purged as u64);
        Self::record_size(remaining);
    }
}

/// Feed refresh metrics recorder.
pub struct FeedMetrics;

impl FeedMetrics {
    /// Record a refresh that replaced the cache.
    pub fn record_refreshed(feed: &'static str) {
        counter!("replay_feed_refreshed_total", "feed" => feed).increment(1);
    }

    /// Record a failed refresh.
    pub fn record_failure(feed: &'static str) {
        counter!("replay_feed_failed_total", "feed" => feed).increment(1);
    }
}

/// Farm fan-out metrics recorder.
pub struct FarmMetrics;

impl FarmMetrics {
    /// Record a failed peer call.
    pub fn record_peer_failure(operation: &'static str) {
        counter!("farm_peer_failures_total", "operation" => operation).increment(1);
    }
}

/// Adapter metrics recorder.
pub struct AdapterMetrics;

impl AdapterMetrics {
    /// Record a completed authentication.
    pub fn record_completed(method: &'static str) {
        counter!("adapter_authentications_completed_total", "method" => method).increment(1);
    }

    /// Record a lockout.
    pub fn record_lockout() {
        counter!("adapter_lockouts_total").increment(1);
    }
}

/// Driver metrics recorder.
pub struct DriverMetrics;

impl DriverMetrics {
    /// Record a reduced action.
    pub fn record_action(duration: Duration) {
        counter!("driver_actions_processed_total").increment(1);
        histogram!("driver_reduce_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a run aborted by the step limit.
    pub fn record_step_limit() {
        counter!("driver_step_limit_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:9464".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        ReplayMetrics::record_check(false);
        FeedMetrics::record_refreshed("payload");

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("replay_records_rejected_total"));
            assert!(rendered.contains("replay_feed_refreshed_total"));
        }
    }
}
