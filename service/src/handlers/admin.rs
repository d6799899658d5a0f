//! Farm-wide operations.
//!
//! Every route requires the caller's SID in [`CALLER_SID_HEADER`] and checks
//! it against the administrators listed in the encrypted security metadata.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::HeaderMap};
use farm_mfa_replay::{BroadcastReport, FarmNotification, Notifier, PeerClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header carrying the caller's security identifier.
pub const CALLER_SID_HEADER: &str = "x-farm-caller-sid";

/// `POST /admin/broadcast`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    /// Notification applied on every node
    pub notification: FarmNotification,
}

/// A node that could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFailure {
    /// Node name
    pub server: String,
    /// Transport error
    pub reason: String,
}

/// Outcome of a farm-wide operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmReport {
    /// Nodes that acknowledged
    pub delivered: Vec<String>,
    /// Nodes that failed
    pub failed: Vec<PeerFailure>,
}

impl From<BroadcastReport> for FarmReport {
    fn from(report: BroadcastReport) -> Self {
        Self {
            delivered: report.delivered,
            failed: report
                .failed
                .into_iter()
                .map(|(server, reason)| PeerFailure { server, reason })
                .collect(),
        }
    }
}

async fn authorize<P, N>(state: &AppState<P, N>, headers: &HeaderMap) -> Result<String, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    let caller = headers
        .get(CALLER_SID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| AppError::unauthorized(format!("Missing {CALLER_SID_HEADER} header")))?;

    if state.security_metadata().await?.is_administrator(caller) {
        Ok(caller.to_string())
    } else {
        tracing::warn!(caller = %caller, "Rejected administration call");
        Err(AppError::forbidden("Caller is not a farm administrator"))
    }
}

/// `POST /admin/broadcast`: apply a notification here and on every other node.
///
/// # Errors
///
/// 401/403 for unauthorised callers, 503 without security metadata.
pub async fn broadcast<P, N>(
    State(state): State<Arc<AppState<P, N>>>,
    headers: HeaderMap,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<FarmReport>, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    let caller = authorize(&state, &headers).await?;
    tracing::info!(caller = %caller, notification = ?request.notification, "Farm broadcast");

    let servers = state.servers().await;
    let report = state.replay().broadcast(&servers, request.notification).await;
    Ok(Json(report.into()))
}

/// `POST /admin/reset`: empty the replay list on every node.
///
/// # Errors
///
/// 401/403 for unauthorised callers, 503 without security metadata.
pub async fn reset_farm<P, N>(
    State(state): State<Arc<AppState<P, N>>>,
    headers: HeaderMap,
) -> Result<Json<FarmReport>, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    let caller = authorize(&state, &headers).await?;
    tracing::info!(caller = %caller, "Farm replay reset");

    let servers = state.servers().await;
    Ok(Json(state.replay().reset(&servers, true).await.into()))
}

/// `POST /admin/warmup`: probe every other node.
///
/// # Errors
///
/// 401/403 for unauthorised callers, 503 without security metadata.
pub async fn warm_up_farm<P, N>(
    State(state): State<Arc<AppState<P, N>>>,
    headers: HeaderMap,
) -> Result<Json<FarmReport>, AppError>
where
    P: PeerClient,
    N: Notifier,
{
    authorize(&state, &headers).await?;
    let servers = state.servers().await;
    Ok(Json(state.replay().warm_up_farm(&servers).await.into()))
}
