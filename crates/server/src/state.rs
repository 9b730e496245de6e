//! The process-wide state every connection task shares.
//!
//! World state sits behind one `RwLock` so each handler's read-modify-write
//! is atomic with respect to other connections; player profiles live in a
//! sharded `DashMap` inside [`PlayerStore`]. No lock is ever held across an
//! `.await`: accessors take closures so guards cannot escape.

use std::sync::RwLock;

use anyhow::Result;
use serde::Serialize;

use digsite_engine::config::ServerConfig;
use digsite_engine::ids::ShortId;
use digsite_engine::players::PlayerStore;
use digsite_engine::world::WorldState;

use crate::broadcast::{FanoutReport, Outbound, Outbox, OUTBOX_CAPACITY};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::protocol::Message;
use crate::session_registry::{ConnId, Session, SessionRegistry};

/// Game version clients must announce in `requestconnect`.
pub const DEFAULT_GAME_VERSION: &str = "v1.9";

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub game_version: String,
    pub outbox_capacity: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            game_version: DEFAULT_GAME_VERSION.to_string(),
            outbox_capacity: OUTBOX_CAPACITY,
        }
    }
}

pub struct ServerState {
    config: RwLock<ServerConfig>,
    world: RwLock<WorldState>,
    pub players: PlayerStore,
    pub sessions: SessionRegistry,
    pub metrics: Metrics,
    options: ServerOptions,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        world: WorldState,
        players: PlayerStore,
        options: ServerOptions,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            world: RwLock::new(world),
            players,
            sessions: SessionRegistry::new(),
            metrics: Metrics::new(),
            options,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn game_version(&self) -> &str {
        &self.options.game_version
    }

    // ── Config ───────────────────────────────────────────────────────────

    pub fn read_config<R>(&self, f: impl FnOnce(&ServerConfig) -> R) -> R {
        f(&self.config.read().expect("config lock poisoned"))
    }

    pub fn config(&self) -> ServerConfig {
        self.read_config(ServerConfig::clone)
    }

    /// Swap in a new config, returning the old one. Connected clients keep
    /// whatever map data they already fetched.
    pub fn replace_config(&self, config: ServerConfig) -> ServerConfig {
        let mut guard = self.config.write().expect("config lock poisoned");
        std::mem::replace(&mut *guard, config)
    }

    // ── World ────────────────────────────────────────────────────────────

    pub fn read_world<R>(&self, f: impl FnOnce(&WorldState) -> R) -> R {
        f(&self.world.read().expect("world lock poisoned"))
    }

    pub fn write_world<R>(&self, f: impl FnOnce(&mut WorldState) -> R) -> R {
        f(&mut self.world.write().expect("world lock poisoned"))
    }

    pub fn world_time(&self) -> f64 {
        self.read_world(WorldState::time)
    }

    pub fn advance_clock(&self, delta: f64) -> f64 {
        self.write_world(|world| world.advance_clock(delta))
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Register a session for `identity`, creating its profile on first
    /// sight, and announce the join to everyone else.
    pub fn connect_session(
        &self,
        id: ShortId,
        identity: &str,
        username: &str,
        conn_id: ConnId,
        outbox: Outbox,
    ) -> Result<Session> {
        let spawn = self.read_config(|c| c.player_spawn_point);
        if self.players.ensure(identity, spawn) {
            tracing::info!("Created profile for identity {}", identity);
        }
        if self.sessions.identity_in_use(identity) {
            tracing::warn!(
                "Identity {} already has a live session; profile writes from both will interleave",
                identity
            );
        }
        let position = self
            .players
            .get(identity)
            .map(|p| p.position)
            .unwrap_or(spawn);

        let replaced = self
            .sessions
            .connect(id.clone(), identity, username, position, conn_id, outbox)?;
        for old in &replaced {
            self.metrics.session_left();
            self.announce_leave(old, Some(&id));
        }
        self.metrics.session_joined();

        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("session {} vanished during connect", id))?;

        let joined = Message::game("connected", id.as_str())
            .username(username)
            .encode()?;
        self.broadcast(Some(&id), &joined);

        Ok(session)
    }

    /// Drop the session bound to `conn_id`, if any, and tell the others.
    pub fn disconnect_session(&self, conn_id: ConnId) -> Option<Session> {
        let session = self.sessions.disconnect(conn_id)?;
        self.metrics.session_left();
        self.announce_leave(&session, None);
        Some(session)
    }

    fn announce_leave(&self, session: &Session, exclude: Option<&ShortId>) {
        match Message::game("disconnected", session.id.as_str())
            .username(&session.username)
            .encode()
        {
            Ok(left) => {
                self.broadcast(exclude, &left);
            }
            Err(e) => tracing::warn!("Failed to encode leave for {}: {:#}", session.id, e),
        }
    }

    /// Fan `message` out to every session except `exclude`.
    pub fn broadcast(&self, exclude: Option<&ShortId>, message: &Outbound) -> FanoutReport {
        let report = self.sessions.broadcast(exclude, message);
        self.metrics.record_broadcast(report.failed as u64);
        if report.failed > 0 {
            tracing::debug!(
                "Broadcast reached {} sessions, {} deliveries failed",
                report.delivered,
                report.failed
            );
        }
        report
    }

    // ── Status ───────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusReport {
        let (tiles, dropped_items, placed_items, world_time) = self.read_world(|w| {
            (
                w.tiles().len(),
                w.dropped_items().len(),
                w.placed_items().len(),
                w.time(),
            )
        });
        StatusReport {
            game_version: self.options.game_version.clone(),
            sessions: self.sessions.len(),
            profiles: self.players.len(),
            tiles,
            dropped_items,
            placed_items,
            world_time,
            metrics: self.metrics.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub game_version: String,
    pub sessions: usize,
    pub profiles: usize,
    pub tiles: usize,
    pub dropped_items: usize,
    pub placed_items: usize,
    pub world_time: f64,
    pub metrics: MetricsSnapshot,
}
