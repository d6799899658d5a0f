use super::{FeedDocument, FeedKind, parse_update_time};
use crate::error::{ReplayError, Result};
use chrono::{DateTime, Utc};

/// Line-oriented threat list.
///
/// ```text
/// # version: 12
/// # next-update: 2026-10-20T00:00:00Z
/// 203.0.113.7
/// 198.51.100.0/24
/// ```
///
/// Header lines start with `#` and use `:` or `=` as separator; other `#`
/// lines and blank lines are ignored. Every remaining line is one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatInformation {
    /// List version number
    pub number: u64,
    /// Next planned publication
    pub next_update: DateTime<Utc>,
    /// Listed entries, in file order
    pub entries: Vec<String>,
    raw: String,
}

fn invalid(reason: impl Into<String>) -> ReplayError {
    ReplayError::InvalidFeed {
        feed: FeedKind::Threat.as_str(),
        reason: reason.into(),
    }
}

impl FeedDocument for ThreatInformation {
    const FEED: FeedKind = FeedKind::Threat;

    fn parse(raw: &str) -> Result<Self> {
        let mut number = None;
        let mut next_update = None;
        let mut entries = Vec::new();

        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some(comment) = line.strip_prefix('#') else {
                entries.push(line.to_string());
                continue;
            };
            let Some((key, value)) = comment.split_once([':', '=']) else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "version" => {
                    number = Some(
                        value
                            .trim()
                            .parse::<u64>()
                            .map_err(|e| invalid(format!("version: {e}")))?,
                    );
                },
                "next-update" => next_update = Some(parse_update_time(Self::FEED, value)?),
                _ => {},
            }
        }

        Ok(Self {
            number: number.ok_or_else(|| invalid("missing version header"))?,
            next_update: next_update.ok_or_else(|| invalid("missing next-update header"))?,
            entries,
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
