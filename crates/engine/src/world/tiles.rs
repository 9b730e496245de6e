//! Sparse tile overlay on top of the procedurally generated terrain.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::position::TilePos;

/// Opaque tile identifier. The client assigns the meaning.
pub type TileId = i64;

/// One overlay record, in the shape it has on the wire and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: i64,
    pub y: i64,
    pub id: TileId,
}

impl Tile {
    pub fn pos(&self) -> TilePos {
        TilePos::new(self.x, self.y)
    }
}

/// What [`TileOverlay::set`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTileOutcome {
    /// The same id was already recorded; nothing changed.
    Unchanged,
    /// An existing record kept its slot but got a new id.
    Overwritten { previous: TileId },
    /// A new record was appended.
    Inserted,
}

/// Deviations from the generated terrain. Absence means "unmodified".
///
/// At most one record per position; iteration is in first-write order, which
/// is the order replies are paged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileOverlay {
    tiles: IndexMap<TilePos, TileId>,
}

impl TileOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a tile mutation. Re-applying the same id is a no-op, so
    /// redundant mine events are harmless.
    pub fn set(&mut self, pos: TilePos, id: TileId) -> SetTileOutcome {
        match self.tiles.get_mut(&pos) {
            Some(existing) if *existing == id => SetTileOutcome::Unchanged,
            Some(existing) => {
                let previous = *existing;
                *existing = id;
                SetTileOutcome::Overwritten { previous }
            }
            None => {
                self.tiles.insert(pos, id);
                SetTileOutcome::Inserted
            }
        }
    }

    pub fn get(&self, pos: TilePos) -> Option<TileId> {
        self.tiles.get(&pos).copied()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        self.tiles.iter().map(|(pos, &id)| Tile { x: pos.x, y: pos.y, id })
    }

    pub fn to_vec(&self) -> Vec<Tile> {
        self.iter().collect()
    }
}

impl FromIterator<Tile> for TileOverlay {
    /// Later records for the same position win, matching replayed `set` calls.
    fn from_iter<I: IntoIterator<Item = Tile>>(iter: I) -> Self {
        let mut overlay = TileOverlay::new();
        for tile in iter {
            overlay.set(tile.pos(), tile.id);
        }
        overlay
    }
}
