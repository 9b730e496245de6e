//! Snapshot persistence as three independent JSON documents.
//!
//! ```text
//! <data>/server.json            world config
//! <data>/gamedata/map.json      tiles, dropped items, placed items, clock
//! <data>/gamedata/players.json  every player profile
//! ```
//!
//! Each document is loaded once at startup and fully rewritten on save.
//! A document that is missing or unreadable is replaced by defaults, which
//! are written out immediately; a failed load never stops the server.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use digsite_engine::config::ServerConfig;
use digsite_engine::players::{PlayerStore, PlayersSnapshot};
use digsite_engine::world::{WorldSnapshot, WorldState};

use crate::state::{ServerOptions, ServerState};

pub const CONFIG_FILE: &str = "server.json";
pub const GAMEDATA_DIR: &str = "gamedata";
pub const MAP_FILE: &str = "map.json";
pub const PLAYERS_FILE: &str = "players.json";

/// Locations of the three snapshot documents under one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn map(&self) -> PathBuf {
        self.root.join(GAMEDATA_DIR).join(MAP_FILE)
    }

    pub fn players(&self) -> PathBuf {
        self.root.join(GAMEDATA_DIR).join(PLAYERS_FILE)
    }
}

// ── Load ─────────────────────────────────────────────────────────────────────

pub fn load_config(paths: &DataPaths) -> ServerConfig {
    load_or_init(&paths.config(), ServerConfig::default)
}

pub fn load_world(paths: &DataPaths) -> WorldState {
    WorldState::from_snapshot(load_or_init(&paths.map(), WorldSnapshot::default))
}

pub fn load_players(paths: &DataPaths) -> PlayerStore {
    let store = PlayerStore::new();
    store.restore(load_or_init(&paths.players(), PlayersSnapshot::default));
    store
}

/// Load all three documents and assemble the shared server state.
pub fn load_state(paths: &DataPaths, options: ServerOptions) -> ServerState {
    let start = Instant::now();
    let config = load_config(paths);
    let world = load_world(paths);
    let players = load_players(paths);
    tracing::info!(
        "Loaded snapshots from {}: {} tiles, {} dropped items, {} placed items, {} profiles ({:.2?})",
        paths.root().display(),
        world.tiles().len(),
        world.dropped_items().len(),
        world.placed_items().len(),
        players.len(),
        start.elapsed(),
    );
    ServerState::new(config, world, players, options)
}

fn load_or_init<T>(path: &Path, default: impl FnOnce() -> T) -> T
where
    T: Serialize + DeserializeOwned,
{
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("{:#}; initialising {} with defaults", e, path.display());
            if path.exists() {
                quarantine(path);
            }
            let value = default();
            if let Err(e) = write_json_atomic(path, &value) {
                tracing::error!("Failed to write defaults to {}: {:#}", path.display(), e);
            }
            value
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Keep an unparseable document around instead of silently overwriting it.
fn quarantine(path: &Path) {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    match fs::rename(path, &target) {
        Ok(()) => tracing::warn!("Moved unreadable {} aside", path.display()),
        Err(e) => tracing::warn!("Could not move {} aside: {}", path.display(), e),
    }
}

// ── Save ─────────────────────────────────────────────────────────────────────

pub fn save_config(paths: &DataPaths, config: &ServerConfig) -> Result<()> {
    write_json_atomic(&paths.config(), config)
}

pub fn save_world(paths: &DataPaths, world: &WorldState) -> Result<()> {
    write_json_atomic(&paths.map(), &world.snapshot())
}

pub fn save_players(paths: &DataPaths, players: &PlayerStore) -> Result<()> {
    write_json_atomic(&paths.players(), &players.snapshot())
}

/// Write the world and player documents. The config document only changes
/// through [`replace_config`].
pub fn save_all(paths: &DataPaths, state: &ServerState) -> Result<()> {
    let start = Instant::now();
    // Snapshot under the lock, serialise and write outside it.
    let world = state.read_world(WorldState::snapshot);
    write_json_atomic(&paths.map(), &world)?;
    save_players(paths, &state.players)?;
    tracing::info!(
        "Saved {} tiles and {} profiles to {} ({:.2?})",
        world.map_tiles.len(),
        state.players.len(),
        paths.root().display(),
        start.elapsed(),
    );
    Ok(())
}

/// Replace the live config and persist it.
pub fn replace_config(paths: &DataPaths, state: &ServerState, config: ServerConfig) -> Result<()> {
    save_config(paths, &config)?;
    state.replace_config(config);
    Ok(())
}

/// Serialise `value` and replace `path` with it atomically: the bytes go to
/// `<path>.tmp` first and are renamed over the target.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serialising {}", path.display()))?;
    write_bytes_atomic(path, &bytes).with_context(|| format!("writing {}", path.display()))
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ── Tests ────────────────────────────────────────────────────────────────────
