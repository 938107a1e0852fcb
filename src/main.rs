//! Engine entry point: wire configuration, storage, scheduler, and timer
//! dispatch together and run until shutdown.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use wise_old_pea::{
    config::AppConfig,
    services::timer_dispatch,
    state::AppState,
    store::{SnapshotStore, json::JsonFileStore},
    transport::{LoggingTransport, NoopStatsClient, StatsClient},
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn stats_client(config: &AppConfig) -> Arc<dyn StatsClient> {
    #[cfg(feature = "stats-http")]
    if let Some(base_url) = config.stats_base_url.clone() {
        return Arc::new(wise_old_pea::transport::HiscoreClient::new(base_url));
    }
    #[cfg(not(feature = "stats-http"))]
    let _ = &config.stats_base_url;
    Arc::new(NoopStatsClient)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let snapshot_path = config.snapshot_path.clone();
    let audit_path = config.audit_path.clone();
    let stats = stats_client(&config);

    let (state, timer_rx) = AppState::new(config, Arc::new(LoggingTransport), stats);
    tokio::spawn(state.scheduler().clone().run());
    tokio::spawn(timer_dispatch::run(state.clone(), timer_rx));

    let store = Arc::new(JsonFileStore::new(snapshot_path, audit_path));
    let snapshot = store.load().await?;
    state.install_store(store).await;
    state.load_from(snapshot);
    state.rehydrate_timers();
    info!("engine running");

    shutdown_signal().await;
    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
