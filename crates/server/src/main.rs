use std::sync::Arc;

use clap::Parser;
use digsite_server::persistence::{self, DataPaths};
use digsite_server::settings::Settings;
use digsite_server::state::ServerState;
use digsite_server::{net, ticker};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();
    tracing::info!("digsite server {} (game {})", env!("CARGO_PKG_VERSION"), settings.game_version);

    // ── Load snapshots (falls back to defaults, never fatal) ─────────────
    let paths = settings.data_paths();
    let state = Arc::new(persistence::load_state(&paths, settings.options()));

    // ── Background tasks ─────────────────────────────────────────────────
    ticker::start(Arc::clone(&state), settings.tick_period());

    match settings.autosave_interval() {
        Some(period) => spawn_autosave(Arc::clone(&state), paths.clone(), period),
        None => tracing::info!("Autosave disabled"),
    }

    // ── Serve until Ctrl+C ───────────────────────────────────────────────
    tokio::select! {
        result = net::listener::run(Arc::clone(&state), &settings.bind) => {
            if let Err(e) = result {
                tracing::error!("Server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    // ── Save on shutdown ─────────────────────────────────────────────────
    match persistence::save_all(&paths, &state) {
        Ok(()) => tracing::info!("Shutdown save complete"),
        Err(e) => tracing::error!("Shutdown save failed: {:#}", e),
    }
}

fn spawn_autosave(state: Arc<ServerState>, paths: DataPaths, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick is immediate, skip it
        loop {
            interval.tick().await;
            tracing::info!("Autosaving...");
            if let Err(e) = persistence::save_all(&paths, &state) {
                tracing::error!("Autosave failed: {:#}", e);
            }
        }
    });
}
