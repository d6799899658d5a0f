//! Service configuration loaded from `FARM_MFA_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `FARM_MFA_BIND_ADDR` | `0.0.0.0:5987` |
//! | `FARM_MFA_NODE` | `HOSTNAME`, then `localhost` |
//! | `FARM_MFA_SERVERS` | the local node only (comma separated) |
//! | `FARM_MFA_PEER_PORT` | port of `FARM_MFA_BIND_ADDR` |
//! | `FARM_MFA_PEER_TLS` | `false` |
//! | `FARM_MFA_PEER_TIMEOUT_SECS` | `10` |
//! | `FARM_MFA_CACHE_DIR` | `<tmp>/farm-mfa` |
//! | `FARM_MFA_CACHE_KEY` | unset (base64, 32 bytes; enables security metadata) |
//! | `FARM_MFA_ADMIN_SIDS` | empty (comma separated, seeds the security metadata) |
//! | `FARM_MFA_METRICS_ADDR` | unset (no Prometheus recorder) |
//! | `FARM_MFA_LOG_JSON` | `false` |
//! | `FARM_MFA_CLEANUP_SECS` | `60` |
//! | `FARM_MFA_PAYLOAD_URL` / `FARM_MFA_THREAT_URL` | unset (feed disabled) |
//! | `FARM_MFA_REFRESH_SECS` | `43200` |
//! | `FARM_MFA_FEED_TIMEOUT_SECS` | `30` |
//! | `FARM_MFA_BEHAVIOR_LEVEL` | `1` |

use farm_mfa_replay::{FeedConfig, ReplayConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 5987;

/// A variable is set but cannot be used.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("{variable}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    /// Variable name
    pub variable: &'static str,
    /// Offending value
    pub value: String,
    /// Parse failure
    pub reason: String,
}

/// Everything the service binary needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Listen address of the farm HTTP surface
    pub bind_addr: SocketAddr,
    /// Name of this node as other members know it
    pub node: String,
    /// Farm members, this node included
    pub servers: Vec<String>,
    /// Port peers listen on
    pub peer_port: u16,
    /// Reach peers over HTTPS
    pub peer_tls: bool,
    /// Timeout of one peer call
    pub peer_timeout: Duration,
    /// Base64 AES-256 key of the security metadata cache
    pub cache_key: Option<String>,
    /// Administrator SIDs written to a fresh security metadata cache
    pub admin_sids: Vec<String>,
    /// Where Prometheus metrics are advertised
    pub metrics_addr: Option<SocketAddr>,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Replay list and feed settings
    pub replay: ReplayConfig,
}

impl ServiceConfig {
    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first variable that is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns the first variable that is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or("FARM_MFA_BIND_ADDR", var("FARM_MFA_BIND_ADDR"), || {
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
        })?;
        let node = var("FARM_MFA_NODE")
            .or_else(|| var("HOSTNAME"))
            .unwrap_or_else(|| "localhost".to_string());
        let mut servers = var("FARM_MFA_SERVERS").map(|v| split_list(&v)).unwrap_or_default();
        if !servers.iter().any(|s| s.eq_ignore_ascii_case(&node)) {
            servers.insert(0, node.clone());
        }

        let cache_dir = var("FARM_MFA_CACHE_DIR").map_or_else(|| ReplayConfig::default().cache_dir, PathBuf::from);
        let refresh = Duration::from_secs(parse_or("FARM_MFA_REFRESH_SECS", var("FARM_MFA_REFRESH_SECS"), || {
            12 * 60 * 60
        })?);
        let feed_timeout = Duration::from_secs(parse_or(
            "FARM_MFA_FEED_TIMEOUT_SECS",
            var("FARM_MFA_FEED_TIMEOUT_SECS"),
            || 30,
        )?);
        let feed = |url: Option<String>| FeedConfig {
            url,
            refresh_interval: refresh,
            timeout: feed_timeout,
        };
        let replay = ReplayConfig::new(cache_dir)
            .with_cleanup_interval(Duration::from_secs(parse_or(
                "FARM_MFA_CLEANUP_SECS",
                var("FARM_MFA_CLEANUP_SECS"),
                || 60,
            )?))
            .with_payload_feed(feed(var("FARM_MFA_PAYLOAD_URL")))
            .with_threat_feed(feed(var("FARM_MFA_THREAT_URL")))
            .with_behavior_level(parse_or("FARM_MFA_BEHAVIOR_LEVEL", var("FARM_MFA_BEHAVIOR_LEVEL"), || 1)?);

        Ok(Self {
            bind_addr,
            peer_port: parse_or("FARM_MFA_PEER_PORT", var("FARM_MFA_PEER_PORT"), || bind_addr.port())?,
            peer_tls: parse_or("FARM_MFA_PEER_TLS", var("FARM_MFA_PEER_TLS"), || false)?,
            peer_timeout: Duration::from_secs(parse_or(
                "FARM_MFA_PEER_TIMEOUT_SECS",
                var("FARM_MFA_PEER_TIMEOUT_SECS"),
                || 10,
            )?),
            cache_key: var("FARM_MFA_CACHE_KEY"),
            admin_sids: var("FARM_MFA_ADMIN_SIDS").map(|v| split_list(&v)).unwrap_or_default(),
            metrics_addr: var("FARM_MFA_METRICS_ADDR")
                .map(|v| parse_value("FARM_MFA_METRICS_ADDR", v))
                .transpose()?,
            log_json: parse_or("FARM_MFA_LOG_JSON", var("FARM_MFA_LOG_JSON"), || false)?,
            node,
            servers,
            replay,
        })
    }

    /// Location of the encrypted security metadata.
    #[must_use]
    pub fn security_path(&self) -> PathBuf {
        self.replay.cache_dir.join("security.bin")
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T>(variable: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError {
        variable,
        reason: e.to_string(),
        value,
    })
}

fn parse_or<T>(variable: &'static str, value: Option<String>, default: impl FnOnce() -> T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or_else(|| Ok(default()), |v| parse_value(variable, v))
}
