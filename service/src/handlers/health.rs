//! Liveness and metrics endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode};
use farm_mfa_replay::{Notifier, PeerClient};
use std::sync::Arc;

/// `GET /health`: the process is up. Checks no dependency.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// `GET /metrics`: Prometheus text format.
///
/// # Errors
///
/// 404 when no recorder was installed at startup.
pub async fn metrics<P, N>(State(state): State<Arc<AppState<P, N>>>) -> Result<String, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    state
        .render_metrics()
        .ok_or_else(|| AppError::not_found("Metrics are not enabled on this node"))
}
