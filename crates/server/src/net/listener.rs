use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::state::{ServerState, StatusReport};

/// Game socket at `/`, JSON status at `/status`.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/status", get(status))
        .with_state(state)
}

/// Bind `bind_addr` and serve until the process stops.
pub async fn run(state: Arc<ServerState>, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("Listening on {}", bind_addr);
    serve(listener, state).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("http server")
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    tracing::info!("Connection from {}", addr);
    ws.on_upgrade(move |socket| super::connection::handle_socket(socket, state))
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusReport> {
    Json(state.status())
}
