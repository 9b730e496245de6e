use serde::{Deserialize, Serialize};

/// Integer tile coordinate in the terrain grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i64,
    pub y: i64,
}

impl TilePos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Free (pixel-space) position of a player, dropped item, or placed item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
