//! Process settings from the command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::broadcast::OUTBOX_CAPACITY;
use crate::persistence::DataPaths;
use crate::state::{ServerOptions, DEFAULT_GAME_VERSION};

#[derive(Debug, Clone, Parser)]
#[command(name = "digsite-server", version, about = "Authoritative multiplayer server for digsite")]
pub struct Settings {
    /// Address for the WebSocket and status listener.
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Directory holding server.json and gamedata/.
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Game version clients must announce when connecting.
    #[arg(long, default_value = DEFAULT_GAME_VERSION)]
    pub game_version: String,

    /// Seconds between world clock ticks.
    #[arg(long, default_value_t = 5.0, value_parser = parse_positive_secs)]
    pub tick_secs: f64,

    /// Seconds between autosaves; 0 disables autosave.
    #[arg(long, default_value_t = 300)]
    pub autosave_secs: u64,

    /// Frames queued per connection before broadcasts to it are dropped.
    #[arg(long, default_value_t = OUTBOX_CAPACITY, value_parser = parse_capacity)]
    pub outbox_capacity: usize,
}

impl Settings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_secs)
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_secs > 0).then(|| Duration::from_secs(self.autosave_secs))
    }

    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            game_version: self.game_version.clone(),
            outbox_capacity: self.outbox_capacity,
        }
    }
}

fn parse_positive_secs(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("expected a positive number of seconds, got {s}"))
    }
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("{e}")),
    }
}
