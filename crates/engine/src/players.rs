//! Persistent per-identity player data.
//!
//! Profiles are keyed by the durable identity token (`os_uid`) a client sends
//! when it connects, never by session id, so reconnecting players get their
//! old profile back. Profiles are never deleted.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::inventory::{CountOverflow, Inventory};
use crate::world::position::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub position: Position,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub has_flashlight: bool,
    #[serde(default)]
    pub holding_item: String,
    #[serde(default)]
    pub current_drill_level: i64,
    #[serde(default)]
    pub money: i64,
}

impl PlayerProfile {
    /// A fresh profile standing at `spawn` with nothing in its pockets.
    pub fn new(spawn: Position) -> Self {
        Self {
            position: spawn,
            inventory: Inventory::new(),
            has_flashlight: false,
            holding_item: String::new(),
            current_drill_level: 0,
            money: 0,
        }
    }

    pub fn scalar_data(&self) -> ScalarData {
        ScalarData {
            has_flashlight: self.has_flashlight,
            holding_item: self.holding_item.clone(),
            current_drill_level: self.current_drill_level,
            money: self.money,
        }
    }
}

/// The four scalar profile fields. They are only ever written together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarData {
    pub has_flashlight: bool,
    pub holding_item: String,
    pub current_drill_level: i64,
    pub money: i64,
}

/// Thread-safe profile store, sharded by identity.
pub struct PlayerStore {
    profiles: DashMap<String, PlayerProfile>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    /// Create a default profile at `spawn` unless `identity` already has one.
    /// Returns `true` if a profile was created.
    pub fn ensure(&self, identity: &str, spawn: Position) -> bool {
        let mut created = false;
        self.profiles.entry(identity.to_string()).or_insert_with(|| {
            created = true;
            PlayerProfile::new(spawn)
        });
        created
    }

    pub fn get(&self, identity: &str) -> Option<PlayerProfile> {
        self.profiles.get(identity).map(|p| p.value().clone())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.profiles.contains_key(identity)
    }

    /// Unconditional overwrite. Returns `false` if the identity is unknown.
    pub fn update_position(&self, identity: &str, position: Position) -> bool {
        self.with_profile(identity, |p| p.position = position).is_some()
    }

    /// Additive merge into the profile's inventory. Returns the new count,
    /// or `None` if the identity is unknown.
    pub fn add_inventory(
        &self,
        identity: &str,
        item: &str,
        count: i64,
    ) -> Option<Result<i64, CountOverflow>> {
        self.with_profile(identity, |p| p.inventory.add(item, count))
    }

    /// Overwrite all four scalar fields together.
    pub fn update_scalar_data(&self, identity: &str, data: ScalarData) -> bool {
        self.with_profile(identity, |p| {
            p.has_flashlight = data.has_flashlight;
            p.holding_item = data.holding_item;
            p.current_drill_level = data.current_drill_level;
            p.money = data.money;
        })
        .is_some()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Copy of every profile, ordered by identity so saved files are stable.
    pub fn snapshot(&self) -> PlayersSnapshot {
        let player_data = self
            .profiles
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        PlayersSnapshot { player_data }
    }

    /// Replace every profile with the contents of `snapshot`.
    pub fn restore(&self, snapshot: PlayersSnapshot) {
        self.profiles.clear();
        for (identity, profile) in snapshot.player_data {
            self.profiles.insert(identity, profile);
        }
    }

    fn with_profile<R>(&self, identity: &str, f: impl FnOnce(&mut PlayerProfile) -> R) -> Option<R> {
        match self.profiles.get_mut(identity) {
            Some(mut profile) => Some(f(&mut profile)),
            None => {
                tracing::debug!("No profile for identity {}", identity);
                None
            }
        }
    }
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk form of [`PlayerStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayersSnapshot {
    pub player_data: BTreeMap<String, PlayerProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPAWN: Position = Position::new(3200.0, 300.0);

    #[test]
    fn ensure_creates_once() {
        let store = PlayerStore::new();
        assert!(store.ensure("uid-1", SPAWN));
        store.update_position("uid-1", Position::new(1.0, 1.0));
        assert!(!store.ensure("uid-1", SPAWN));
        assert_eq!(store.get("uid-1").unwrap().position, Position::new(1.0, 1.0));
    }

    #[test]
    fn new_profile_has_defaults() {
        let store = PlayerStore::new();
        store.ensure("uid-1", SPAWN);
        let profile = store.get("uid-1").unwrap();
        assert_eq!(profile, PlayerProfile::new(SPAWN));
        assert!(profile.inventory.is_empty());
        assert_eq!(profile.money, 0);
    }

    #[test]
    fn inventory_merge_is_additive() {
        let store = PlayerStore::new();
        store.ensure("uid-1", SPAWN);
        store.add_inventory("uid-1", "5", 3);
        assert_eq!(store.add_inventory("uid-1", "5", 2), Some(Ok(5)));
        assert_eq!(store.get("uid-1").unwrap().inventory.count("5"), Some(5));
    }

    #[test]
    fn overflowing_inventory_deposit_keeps_previous_count() {
        let store = PlayerStore::new();
        store.ensure("uid-1", SPAWN);
        store.add_inventory("uid-1", "5", i64::MAX);
        assert!(matches!(store.add_inventory("uid-1", "5", 1), Some(Err(_))));
        assert_eq!(store.get("uid-1").unwrap().inventory.count("5"), Some(i64::MAX));
    }

    #[test]
    fn scalar_data_overwrites_all_fields() {
        let store = PlayerStore::new();
        store.ensure("uid-1", SPAWN);
        let data = ScalarData {
            has_flashlight: true,
            holding_item: "DRILL".into(),
            current_drill_level: 3,
            money: 120,
        };
        assert!(store.update_scalar_data("uid-1", data.clone()));
        assert_eq!(store.get("uid-1").unwrap().scalar_data(), data);
    }

    #[test]
    fn unknown_identity_is_reported() {
        let store = PlayerStore::new();
        assert!(!store.update_position("ghost", SPAWN));
        assert_eq!(store.add_inventory("ghost", "1", 1), None);
    }

    #[test]
    fn restore_replaces_contents() {
        let store = PlayerStore::new();
        store.ensure("a", SPAWN);
        store.add_inventory("a", "2", 9);
        let snapshot = store.snapshot();

        let other = PlayerStore::new();
        other.ensure("stale", SPAWN);
        other.restore(snapshot.clone());
        assert!(!other.contains("stale"));
        assert_eq!(other.snapshot(), snapshot);
    }
}
