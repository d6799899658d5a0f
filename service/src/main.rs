//! `farm-mfa-service` binary: one farm node.

use anyhow::Context;
use farm_mfa_core::environment::SystemClock;
use farm_mfa_replay::{
    ChannelNotifier, EncryptedCache, FarmNotification, FileFeedCache, HttpFeedSource, HttpPeerClient, ReplayManager,
    ReplayService,
};
use farm_mfa_runtime::metrics::MetricsServer;
use farm_mfa_service::{AppState, SecurityMetadata, ServiceConfig, event_ids, init_tracing, provision_security, router};
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{error, info, warn};

type Manager = ReplayManager<HttpFeedSource, FileFeedCache, ChannelNotifier>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_json)?;
    info!(node = %config.node, servers = ?config.servers, "Starting farm MFA service");

    let notifier = ChannelNotifier::new(16);
    let listener_rx = notifier.subscribe();

    let source = HttpFeedSource::new(config.replay.payload.timeout)?;
    let manager = Arc::new(ReplayManager::new(
        Arc::new(config.replay.clone()),
        source,
        FileFeedCache::new(config.replay.cache_dir.clone()),
        notifier.clone(),
        Arc::new(SystemClock),
    ));
    let listener = tokio::spawn(handle_notifications(listener_rx, Arc::clone(&manager)));
    manager.start();

    let mut peers = HttpPeerClient::new(config.peer_port, config.peer_timeout)?;
    if config.peer_tls {
        peers = peers.with_tls();
    }
    let replay = ReplayService::new(config.node.clone(), manager.records(), peers, notifier);
    let mut state = AppState::new(replay, config.servers.clone());

    if let Some(key) = &config.cache_key {
        let cache = EncryptedCache::from_base64_key(config.security_path(), key)?;
        let seed = SecurityMetadata {
            service_account_sid: None,
            admin_sids: config.admin_sids.clone(),
            servers: config.servers.clone(),
        };
        provision_security(&cache, &seed)
            .await
            .context("Security metadata cannot be provisioned")?;
        state = state.with_security(cache);
    } else {
        warn!("FARM_MFA_CACHE_KEY is not set; administration routes are disabled");
    }

    if let Some(addr) = config.metrics_addr {
        let mut server = MetricsServer::new(addr);
        server.start()?;
        state = state.with_metrics(Arc::new(server));
    }

    let app = router(Arc::new(state));
    let tcp = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Cannot bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Farm service listening");

    axum::serve(tcp, app).with_graceful_shutdown(shutdown_signal()).await?;

    manager.close();
    manager.drain().await;
    listener.abort();
    info!("Farm MFA service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Act on notifications published by the refresh loops and by `/notify`.
async fn handle_notifications(mut rx: Receiver<FarmNotification>, manager: Arc<Manager>) {
    loop {
        match rx.recv().await {
            Ok(FarmNotification::ReloadConfiguration) => match manager.payload_information().await {
                Some(payload) => info!(
                    number = payload.number,
                    next_update = %payload.next_update,
                    "Configuration reloaded from payload"
                ),
                None => info!("Configuration reload requested before any payload was loaded"),
            },
            Ok(FarmNotification::RefreshManagementData) => match manager.threat_information().await {
                Some(threat) => info!(
                    number = threat.number,
                    entries = threat.entries.len(),
                    "Management data refreshed"
                ),
                None => info!("Management data refresh requested before any threat list was loaded"),
            },
            Ok(FarmNotification::ResetReplay) => {
                let removed = manager.reset();
                info!(removed, "Replay list reset");
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification listener lagged"),
            Err(RecvError::Closed) => {
                error!(
                    event_id = event_ids::NOTIFICATION_LISTENER_STOPPED,
                    "Notification channel closed"
                );
                break;
            },
        }
    }
}
