use super::{FeedDocument, FeedKind, parse_update_time};
use crate::error::{ReplayError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Signed payload blob.
///
/// The body is a three-segment JWT-like token. Only the middle segment is
/// read: base64url JSON carrying `no` and `nextUpdate`. Signature checks are
/// left to the consumer of the cached body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPayloadInformation {
    /// Blob version number
    pub number: u64,
    /// Next planned publication
    pub next_update: DateTime<Utc>,
    raw: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobClaims {
    no: u64,
    next_update: String,
}

fn invalid(reason: impl Into<String>) -> ReplayError {
    ReplayError::InvalidFeed {
        feed: FeedKind::Payload.as_str(),
        reason: reason.into(),
    }
}

impl FeedDocument for BlobPayloadInformation {
    const FEED: FeedKind = FeedKind::Payload;

    fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.trim().split('.').collect();
        let [_, claims, _] = segments.as_slice() else {
            return Err(invalid(format!("expected 3 segments, found {}", segments.len())));
        };

        let json = URL_SAFE_NO_PAD
            .decode(claims.trim_end_matches('='))
            .map_err(|e| invalid(format!("claims are not base64url: {e}")))?;
        let claims: BlobClaims =
            serde_json::from_slice(&json).map_err(|e| invalid(format!("claims: {e}")))?;

        Ok(Self {
            number: claims.no,
            next_update: parse_update_time(Self::FEED, &claims.next_update)?,
            raw: raw.to_string(),
        })
    }

    fn number(&self) -> u64 {
        self.number
    }

    fn next_update(&self) -> DateTime<Utc> {
        self.next_update
    }

    fn raw(&self) -> &str {
        &self.raw
    }
}
