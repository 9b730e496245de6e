//! Item-id → count mappings shared by player profiles and chests.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A deposit that would push a stack past `i64` range. Nothing is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountOverflow {
    pub item: String,
    pub current: i64,
    pub added: i64,
}

impl fmt::Display for CountOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adding {} to item {} (holding {}) overflows the stack count",
            self.added, self.item, self.current
        )
    }
}

impl std::error::Error for CountOverflow {}

/// Stack counts keyed by the string form of an item id.
///
/// Keys stay in first-insertion order so snapshots and replies are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(IndexMap<String, i64>);

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additive merge: initialises the slot to `count`, or adds to it.
    /// Returns the new count for the slot.
    pub fn add(&mut self, item: &str, count: i64) -> Result<i64, CountOverflow> {
        let current = self.count(item).unwrap_or(0);
        let total = current.checked_add(count).ok_or_else(|| CountOverflow {
            item: item.to_string(),
            current,
            added: count,
        })?;
        self.0.insert(item.to_string(), total);
        Ok(total)
    }

    pub fn count(&self, item: &str) -> Option<i64> {
        self.0.get(item).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_counts() {
        let mut inv = Inventory::new();
        assert_eq!(inv.add("5", 3), Ok(3));
        assert_eq!(inv.add("5", 2), Ok(5));
        assert_eq!(inv.count("5"), Some(5));
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn serializes_as_flat_object() {
        let mut inv = Inventory::new();
        inv.add("12", 1).unwrap();
        inv.add("3", 4).unwrap();
        let json = serde_json::to_string(&inv).unwrap();
        assert_eq!(json, r#"{"12":1,"3":4}"#);
    }

    #[test]
    fn overflowing_deposit_is_refused_and_leaves_stack_alone() {
        let mut inv = Inventory::new();
        assert_eq!(inv.add("9", i64::MAX), Ok(i64::MAX));
        let err = inv.add("9", i64::MAX).unwrap_err();
        assert_eq!(err.current, i64::MAX);
        assert_eq!(inv.count("9"), Some(i64::MAX));

        assert_eq!(inv.add("4", i64::MIN), Ok(i64::MIN));
        assert!(inv.add("4", -1).is_err());
        assert_eq!(inv.count("4"), Some(i64::MIN));
    }
}
