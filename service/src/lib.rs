//! # Farm MFA Service
//!
//! The companion service every farm node runs next to the authentication
//! adapter. It exposes the replay wire contract to the other nodes, applies
//! farm notifications locally, and gates farm-wide operations behind the
//! administrator list held in the encrypted security metadata.
//!
//! | Route | Caller |
//! |---|---|
//! | `POST /replay/check` | peer nodes |
//! | `POST /replay/reset` | peer nodes |
//! | `GET /replay/warmup` | peer nodes |
//! | `POST /notify` | peer nodes |
//! | `POST /admin/broadcast` | administrators |
//! | `POST /admin/reset` | administrators |
//! | `POST /admin/warmup` | administrators |
//! | `GET /health` | load balancers |
//! | `GET /metrics` | Prometheus |

use axum::{
    Router,
    routing::{get, post},
};
use farm_mfa_replay::wire::{CHECK_PATH, NOTIFY_PATH, RESET_PATH, WARMUP_PATH};
use farm_mfa_replay::{Notifier, PeerClient};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::{ConfigError, ServiceConfig};
pub use error::AppError;
pub use state::{AppState, SecurityMetadata, provision_security};

/// Event-log codes attached as `event_id` to error and warning logs.
pub mod event_ids {
    /// The security metadata exists but could not be read.
    pub const SECURITY_METADATA_UNREADABLE: u32 = 1401;
    /// The notification listener stopped.
    pub const NOTIFICATION_LISTENER_STOPPED: u32 = 1402;
}

/// Default `RUST_LOG` directives.
pub const DEFAULT_LOG_FILTER: &str = "farm_mfa=info,tower_http=info";

/// Build the HTTP surface of one node.
pub fn router<P, N>(state: Arc<AppState<P, N>>) -> Router
where
    P: PeerClient + 'static,
    N: Notifier + 'static,
{
    use handlers::{admin, farm, health};

    Router::new()
        .route(CHECK_PATH, post(farm::check::<P, N>))
        .route(RESET_PATH, post(farm::reset::<P, N>))
        .route(WARMUP_PATH, get(farm::warm_up::<P, N>))
        .route(NOTIFY_PATH, post(farm::notify::<P, N>))
        .route("/admin/broadcast", post(admin::broadcast::<P, N>))
        .route("/admin/reset", post(admin::reset_farm::<P, N>))
        .route("/admin/warmup", post(admin::warm_up_farm::<P, N>))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics::<P, N>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the global `tracing` subscriber.
///
/// Filters come from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
