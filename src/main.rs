use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

mod config;
mod dashboard;
mod db;
mod error;
mod gateway;
mod live;
mod scheduler;
mod sync;

use config::Config;
use dashboard::AppState;
use db::{Cache, Database};
use gateway::{DataGateway, GridClient};
use live::{LiveMatchTracker, SeriesPoller};
use sync::RosterSync;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open the cache database
    let db = Database::open(&config.database_path)?;
    info!("Cache database opened: {}", config.database_path);
    let cache = Cache::new(Arc::new(db));

    let gateway: Arc<dyn DataGateway> = Arc::new(GridClient::new(
        &config.grid_api_url,
        &config.grid_series_state_url,
        config.grid_api_key.clone(),
        &config.organization_id,
        config.team_id(),
    )?);
    if config.grid_api_key.is_none() {
        warn!("GRID_API_KEY not set; requests will likely be denied");
    }
    info!("Data gateway: {}", gateway.name());

    let roster = RosterSync::new(gateway.clone(), cache.clone(), config.roster_sync());
    let tracker = LiveMatchTracker::new(gateway.clone(), cache.clone(), config.tracker());
    let poller = SeriesPoller::new(gateway, cache, config.series_poll_interval());

    log_events("roster", roster.subscribe());
    log_events("live", tracker.subscribe());
    log_events("series", poller.subscribe());

    // Seed the roster cache; a failure leaves whatever was cached before.
    match roster.refresh(false).await {
        Ok(snapshot) => info!("Roster ready: {} players", snapshot.players.len()),
        Err(e) => warn!("Initial roster sync failed: {}", e),
    }

    tracker.restore();
    if config.auto_detect && !tracker.auto_detect_enabled() {
        tracker.set_auto_detect(true);
    }
    if let Some(series_id) = poller.resume() {
        info!("Resumed polling series {}", series_id);
    }

    // Start the control API
    let app = dashboard::router(AppState {
        roster,
        tracker,
        poller,
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Control API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run the API server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}

/// Forward every notification on `rx` to the log as JSON.
fn log_events<E>(channel: &'static str, mut rx: broadcast::Receiver<E>)
where
    E: Clone + Debug + Serialize + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("[{}] {}", channel, json),
                    Err(_) => info!("[{}] {:?}", channel, event),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("[{}] event log lagged, {} events dropped", channel, n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
