//! JSON bodies exchanged between farm nodes.

use crate::notify::FarmNotification;
use crate::record::ReplayRecord;
use serde::{Deserialize, Serialize};

/// Route: replay check.
pub const CHECK_PATH: &str = "/replay/check";
/// Route: replay reset.
pub const RESET_PATH: &str = "/replay/reset";
/// Route: connectivity probe.
pub const WARMUP_PATH: &str = "/replay/warmup";
/// Route: notification delivery.
pub const NOTIFY_PATH: &str = "/notify";

/// `POST /replay/check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    /// Farm members known to the caller
    pub servers: Vec<String>,
    /// Attempt to check
    pub record: ReplayRecord,
}

/// Answer to [`CheckRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// `true` when the code is novel on the answering node
    pub accepted: bool,
}

/// `POST /replay/reset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    /// Farm members known to the caller
    pub servers: Vec<String>,
    /// Relay the reset to the other members
    pub must_dispatch: bool,
}

/// `POST /notify`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    /// What the node should do
    pub notification: FarmNotification,
}

/// Answer to `GET /replay/warmup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmUpResponse {
    /// Name of the answering node
    pub node: String,
}
