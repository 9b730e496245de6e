//! Items lying on the ground and items placed into the world (chests etc.).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::position::Position;
use super::tiles::TileId;
use crate::ids::ShortId;
use crate::inventory::{CountOverflow, Inventory};

/// Placed-item type that owns a chest id and an inventory.
pub const CHEST: &str = "CHEST";

// ── Dropped items ────────────────────────────────────────────────────────

/// A dropped item as stored. The uid is the map key, not a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub x: f64,
    pub y: f64,
    pub id: TileId,
}

/// A dropped item together with its uid, as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedItemEntry {
    pub x: f64,
    pub y: f64,
    pub id: TileId,
    pub uid: ShortId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DroppedItems {
    items: IndexMap<ShortId, DroppedItem>,
}

impl DroppedItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new item under a fresh uid that no live item uses.
    pub fn drop_item(&mut self, pos: Position, id: TileId) -> DroppedItemEntry {
        let uid = ShortId::generate_unique(|candidate| self.items.contains_key(candidate));
        self.items
            .insert(uid.clone(), DroppedItem { x: pos.x, y: pos.y, id });
        DroppedItemEntry { x: pos.x, y: pos.y, id, uid }
    }

    /// Remove by uid. Returns the removed item, `None` if it was already gone.
    pub fn remove(&mut self, uid: &ShortId) -> Option<DroppedItem> {
        self.items.shift_remove(uid)
    }

    pub fn get(&self, uid: &ShortId) -> Option<&DroppedItem> {
        self.items.get(uid)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn entries(&self) -> Vec<DroppedItemEntry> {
        self.items
            .iter()
            .map(|(uid, item)| DroppedItemEntry {
                x: item.x,
                y: item.y,
                id: item.id,
                uid: uid.clone(),
            })
            .collect()
    }

    pub(crate) fn from_map(items: IndexMap<ShortId, DroppedItem>) -> Self {
        Self { items }
    }

    pub(crate) fn as_map(&self) -> &IndexMap<ShortId, DroppedItem> {
        &self.items
    }
}

// ── Placed items ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chest_id: Option<ShortId>,
    /// Created on the first deposit, so an untouched chest has no key at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chest_inventory: Option<Inventory>,
}

impl PlacedItem {
    pub fn is_chest(&self) -> bool {
        self.kind == CHEST
    }

    fn is_at(&self, pos: Position) -> bool {
        self.x == pos.x && self.y == pos.y
    }
}

/// Ordered list of placed items. Clients always receive the whole list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacedItems {
    items: Vec<PlacedItem>,
}

impl PlacedItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Chests get a fresh chest id.
    ///
    /// Returns `None` without changing anything if the position is already
    /// occupied.
    pub fn add(&mut self, pos: Position, kind: &str) -> Option<&PlacedItem> {
        if self.items.iter().any(|item| item.is_at(pos)) {
            tracing::debug!("Placed item at ({}, {}) already exists", pos.x, pos.y);
            return None;
        }
        let chest_id = (kind == CHEST).then(|| {
            ShortId::generate_unique(|candidate| {
                self.items
                    .iter()
                    .any(|item| item.chest_id.as_ref() == Some(candidate))
            })
        });
        self.items.push(PlacedItem {
            x: pos.x,
            y: pos.y,
            kind: kind.to_string(),
            chest_id,
            chest_inventory: None,
        });
        self.items.last()
    }

    /// Remove the first item at `pos`, if any.
    pub fn remove_at(&mut self, pos: Position) -> Option<PlacedItem> {
        let idx = self.items.iter().position(|item| item.is_at(pos))?;
        Some(self.items.remove(idx))
    }

    /// Deposit `count` of `item` into the chest with `chest_id`.
    ///
    /// Returns the chest's new count for the item, or `None` (and changes
    /// nothing) when no chest has that id.
    pub fn add_chest_item(
        &mut self,
        chest_id: &ShortId,
        item: &str,
        count: i64,
    ) -> Option<Result<i64, CountOverflow>> {
        let chest = self
            .items
            .iter_mut()
            .find(|placed| placed.is_chest() && placed.chest_id.as_ref() == Some(chest_id))?;
        Some(chest.chest_inventory.get_or_insert_with(Inventory::new).add(item, count))
    }

    pub fn chest(&self, chest_id: &ShortId) -> Option<&PlacedItem> {
        self.items
            .iter()
            .find(|placed| placed.is_chest() && placed.chest_id.as_ref() == Some(chest_id))
    }

    pub fn as_slice(&self) -> &[PlacedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn from_vec(items: Vec<PlacedItem>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_items_get_distinct_uids() {
        let mut dropped = DroppedItems::new();
        let a = dropped.drop_item(Position::new(1.0, 2.0), 4);
        let b = dropped.drop_item(Position::new(1.0, 2.0), 4);
        assert_ne!(a.uid, b.uid);
        assert_eq!(dropped.len(), 2);
    }

    #[test]
    fn removing_unknown_dropped_item_is_noop() {
        let mut dropped = DroppedItems::new();
        let entry = dropped.drop_item(Position::new(0.0, 0.0), 1);
        assert!(dropped.remove(&ShortId::from("NOPE00")).is_none());
        assert_eq!(dropped.len(), 1);
        assert!(dropped.remove(&entry.uid).is_some());
        assert!(dropped.is_empty());
    }

    #[test]
    fn only_chests_get_chest_ids() {
        let mut placed = PlacedItems::new();
        let torch = placed.add(Position::new(0.0, 0.0), "TORCH").cloned().unwrap();
        let chest = placed.add(Position::new(1.0, 0.0), CHEST).cloned().unwrap();
        assert!(torch.chest_id.is_none());
        assert!(chest.chest_id.is_some());
        assert!(chest.chest_inventory.is_none());
    }

    #[test]
    fn occupied_position_rejects_second_item() {
        let mut placed = PlacedItems::new();
        assert!(placed.add(Position::new(5.0, 5.0), "TORCH").is_some());
        assert!(placed.add(Position::new(5.0, 5.0), CHEST).is_none());
        assert_eq!(placed.len(), 1);
    }

    #[test]
    fn remove_at_takes_first_match_only() {
        let mut placed = PlacedItems::new();
        placed.add(Position::new(0.0, 0.0), "TORCH");
        placed.add(Position::new(2.0, 0.0), "LADDER");
        let removed = placed.remove_at(Position::new(2.0, 0.0)).unwrap();
        assert_eq!(removed.kind, "LADDER");
        assert!(placed.remove_at(Position::new(2.0, 0.0)).is_none());
        assert_eq!(placed.len(), 1);
    }

    #[test]
    fn chest_deposits_accumulate() {
        let mut placed = PlacedItems::new();
        let chest_id = placed
            .add(Position::new(0.0, 0.0), CHEST)
            .and_then(|c| c.chest_id.clone())
            .unwrap();
        assert_eq!(placed.add_chest_item(&chest_id, "7", 3), Some(Ok(3)));
        assert_eq!(placed.add_chest_item(&chest_id, "7", 4), Some(Ok(7)));
        let inv = placed.chest(&chest_id).unwrap().chest_inventory.as_ref().unwrap();
        assert_eq!(inv.count("7"), Some(7));
    }

    #[test]
    fn unknown_chest_is_silent_noop() {
        let mut placed = PlacedItems::new();
        placed.add(Position::new(0.0, 0.0), CHEST);
        let before = placed.clone();
        assert_eq!(placed.add_chest_item(&ShortId::from("ZZZZZZ"), "7", 3), None);
        assert_eq!(placed, before);
    }

    #[test]
    fn chest_serializes_with_type_key() {
        let mut placed = PlacedItems::new();
        placed.add(Position::new(1.0, 2.0), "TORCH");
        let json = serde_json::to_value(placed.as_slice()).unwrap();
        assert_eq!(json, serde_json::json!([{"x": 1.0, "y": 2.0, "type": "TORCH"}]));
    }
}
