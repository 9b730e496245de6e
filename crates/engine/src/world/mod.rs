pub mod items;
pub mod position;
pub mod tiles;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::ShortId;
use crate::inventory::CountOverflow;
use items::{DroppedItem, DroppedItemEntry, DroppedItems, PlacedItem, PlacedItems};
use position::{Position, TilePos};
use tiles::{SetTileOutcome, Tile, TileId, TileOverlay};

/// Virtual world time. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldClock(f64);

impl WorldClock {
    pub const fn new(time: f64) -> Self {
        Self(time)
    }

    pub fn time(&self) -> f64 {
        self.0
    }

    /// Advance by `delta`. Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) -> f64 {
        if delta.is_finite() && delta > 0.0 {
            self.0 += delta;
        }
        self.0
    }
}

/// All shared world state that players can change: the tile overlay, items
/// on the ground, placed items, and the clock.
///
/// Plain data with `&mut self` mutators; the server decides how to share it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    tiles: TileOverlay,
    dropped: DroppedItems,
    placed: PlacedItems,
    clock: WorldClock,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tile(&mut self, x: i64, y: i64, id: TileId) -> SetTileOutcome {
        self.tiles.set(TilePos::new(x, y), id)
    }

    pub fn tile(&self, x: i64, y: i64) -> Option<TileId> {
        self.tiles.get(TilePos::new(x, y))
    }

    pub fn tiles(&self) -> &TileOverlay {
        &self.tiles
    }

    pub fn drop_item(&mut self, x: f64, y: f64, id: TileId) -> DroppedItemEntry {
        self.dropped.drop_item(Position::new(x, y), id)
    }

    pub fn remove_dropped_item(&mut self, uid: &ShortId) -> Option<DroppedItem> {
        self.dropped.remove(uid)
    }

    pub fn dropped_items(&self) -> &DroppedItems {
        &self.dropped
    }

    /// Place an item and return the whole placed list, which is what
    /// clients receive after any placed-item change.
    pub fn add_placed_item(&mut self, x: f64, y: f64, kind: &str) -> &[PlacedItem] {
        self.placed.add(Position::new(x, y), kind);
        self.placed.as_slice()
    }

    pub fn remove_placed_item(&mut self, x: f64, y: f64) -> &[PlacedItem] {
        self.placed.remove_at(Position::new(x, y));
        self.placed.as_slice()
    }

    /// `None` when no chest has `chest_id`; the deposit is then ignored.
    pub fn add_chest_item(
        &mut self,
        chest_id: &ShortId,
        item: &str,
        count: i64,
    ) -> Option<Result<i64, CountOverflow>> {
        let result = self.placed.add_chest_item(chest_id, item, count);
        if result.is_none() {
            tracing::debug!("Chest {} not found, deposit ignored", chest_id);
        }
        result
    }

    pub fn placed_items(&self) -> &PlacedItems {
        &self.placed
    }

    pub fn advance_clock(&mut self, delta: f64) -> f64 {
        self.clock.advance(delta)
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            map_tiles: self.tiles.to_vec(),
            map_dropped_items: self.dropped.as_map().clone(),
            map_placed_items: self.placed.as_slice().to_vec(),
            map_time: self.clock,
        }
    }

    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            tiles: snapshot.map_tiles.into_iter().collect(),
            dropped: DroppedItems::from_map(snapshot.map_dropped_items),
            placed: PlacedItems::from_vec(snapshot.map_placed_items),
            clock: snapshot.map_time,
        }
    }
}

/// On-disk form of [`WorldState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub map_tiles: Vec<Tile>,
    pub map_dropped_items: IndexMap<ShortId, DroppedItem>,
    pub map_placed_items: Vec<PlacedItem>,
    pub map_time: WorldClock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_backwards() {
        let mut clock = WorldClock::new(10.0);
        assert_eq!(clock.advance(2.5), 12.5);
        assert_eq!(clock.advance(-5.0), 12.5);
        assert_eq!(clock.advance(f64::NAN), 12.5);
    }

    #[test]
    fn placed_item_ops_return_full_list() {
        let mut world = WorldState::new();
        world.add_placed_item(0.0, 0.0, "TORCH");
        let list = world.add_placed_item(1.0, 0.0, items::CHEST);
        assert_eq!(list.len(), 2);
        let list = world.remove_placed_item(0.0, 0.0);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, items::CHEST);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut world = WorldState::new();
        world.set_tile(1, 2, 3);
        world.set_tile(4, 5, 0);
        world.drop_item(10.0, 20.5, 9);
        world.add_placed_item(3.0, 3.0, items::CHEST);
        let chest_id = world.placed_items().as_slice()[0].chest_id.clone().unwrap();
        world.add_chest_item(&chest_id, "9", 2);
        world.advance_clock(7.5);

        let json = serde_json::to_string(&world.snapshot()).unwrap();
        let restored = WorldState::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored, world);
    }
}
