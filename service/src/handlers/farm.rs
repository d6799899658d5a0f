//! Routes called by the other farm nodes.
//!
//! Requests arrive already relayed once at most: a peer clears
//! `must_dispatch` before calling, so these handlers never fan out a check
//! or reset they did not originate.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use farm_mfa_replay::wire::{CheckRequest, CheckResponse, NotifyRequest, ResetRequest, WarmUpResponse};
use farm_mfa_replay::{Notifier, PeerClient};
use std::sync::Arc;

/// `POST /replay/check`
pub async fn check<P, N>(
    State(state): State<Arc<AppState<P, N>>>,
    Json(request): Json<CheckRequest>,
) -> Json<CheckResponse>
where
    P: PeerClient,
    N: Notifier,
{
    let accepted = state.replay().check(&request.servers, request.record).await;
    Json(CheckResponse { accepted })
}

/// `POST /replay/reset`
pub async fn reset<P, N>(State(state): State<Arc<AppState<P, N>>>, Json(request): Json<ResetRequest>) -> StatusCode
where
    P: PeerClient,
    N: Notifier,
{
    let report = state.replay().reset(&request.servers, request.must_dispatch).await;
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "Reset did not reach every node");
    }
    StatusCode::NO_CONTENT
}

/// `GET /replay/warmup`
#[allow(clippy::unused_async)]
pub async fn warm_up<P, N>(State(state): State<Arc<AppState<P, N>>>) -> Json<WarmUpResponse>
where
    P: PeerClient,
    N: Notifier,
{
    state.replay().warm_up();
    Json(WarmUpResponse {
        node: state.replay().node().to_string(),
    })
}

/// `POST /notify`
///
/// # Errors
///
/// 503 when the local notification listener is gone.
pub async fn notify<P, N>(
    State(state): State<Arc<AppState<P, N>>>,
    Json(request): Json<NotifyRequest>,
) -> Result<StatusCode, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    state.replay().notify_local(request.notification).await?;
    Ok(StatusCode::NO_CONTENT)
}
