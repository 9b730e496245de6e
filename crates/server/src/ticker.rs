//! World clock ticker.
//!
//! Fires every `period` and advances the world clock by half of it, so
//! virtual time runs at half wall-clock speed. Every tick pushes the new
//! time to all sessions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::protocol;
use crate::state::ServerState;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(5);

/// Advance the clock by `delta` and broadcast the result.
pub fn tick(state: &ServerState, delta: f64) -> Result<f64> {
    let time = state.advance_clock(delta);
    state.broadcast(None, &protocol::sync_time(time)?);
    Ok(time)
}

pub fn start(state: Arc<ServerState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delta = period.as_secs_f64() / 2.0;
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; the clock only moves after a full period.
        interval.tick().await;
        tracing::info!("World clock started (period {:?}, +{} per tick)", period, delta);
        loop {
            interval.tick().await;
            if let Err(e) = tick(&state, delta) {
                tracing::warn!("Clock tick failed: {:#}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerOptions;
    use digsite_engine::config::ServerConfig;
    use digsite_engine::ids::ShortId;
    use digsite_engine::players::PlayerStore;
    use digsite_engine::world::WorldState;
    use tokio::sync::mpsc;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(
            ServerConfig::default(),
            WorldState::new(),
            PlayerStore::new(),
            ServerOptions::default(),
        ))
    }

    #[test]
    fn tick_advances_and_broadcasts() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(8);
        state
            .connect_session(ShortId::from("AAAAAA"), "uid-a", "alice", 1, tx)
            .unwrap();
        let before = state.metrics.snapshot().broadcasts_sent;

        assert_eq!(tick(&state, 2.5).unwrap(), 2.5);
        assert_eq!(tick(&state, 2.5).unwrap(), 5.0);

        let first: serde_json::Value = serde_json::from_slice(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "synctime");
        assert_eq!(first["data"]["time"], 2.5);
        assert_eq!(state.metrics.snapshot().broadcasts_sent, before + 2);
    }

    #[test]
    fn tick_with_no_sessions_still_moves_the_clock() {
        let state = state();
        tick(&state, 1.0).unwrap();
        assert_eq!(state.world_time(), 1.0);
    }

    #[tokio::test]
    async fn started_ticker_moves_at_half_speed() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(8);
        state
            .connect_session(ShortId::from("AAAAAA"), "uid-a", "alice", 1, tx)
            .unwrap();

        let handle = start(Arc::clone(&state), Duration::from_millis(20));
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        handle.abort();

        let msg: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(msg["data"]["time"], 0.01);
    }
}
