//! Short random identifiers shared by sessions, dropped items, and chests.
//!
//! All three use the same 6-character uppercase-alphanumeric format, so a
//! single [`ShortId`] type covers them.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SHORT_ID_LEN: usize = 6;
pub const SHORT_ID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Give up searching for an unused id after this many collisions. With 36^6
/// possible ids this is only reachable if the `taken` predicate is broken.
const MAX_ATTEMPTS: usize = 64;

/// A 6-character uppercase-alphanumeric token.
///
/// Ids read back from snapshots or from clients are not validated; anything
/// the client echoes back is accepted as an opaque key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ShortId(String);

impl ShortId {
    /// Draw a fresh random id. No uniqueness check.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let alphabet = SHORT_ID_ALPHABET.as_bytes();
        let mut id = String::with_capacity(SHORT_ID_LEN);
        for _ in 0..SHORT_ID_LEN {
            let idx = rng.gen_range(0..alphabet.len());
            id.push(alphabet[idx] as char);
        }
        Self(id)
    }

    /// Draw ids until one is not `taken`.
    pub fn generate_unique(taken: impl Fn(&ShortId) -> bool) -> Self {
        for _ in 0..MAX_ATTEMPTS {
            let id = Self::generate();
            if !taken(&id) {
                return id;
            }
            tracing::debug!("Short id collision on {}, retrying", id);
        }
        // Practically unreachable; fall back to an id that may collide.
        tracing::warn!("No unused short id after {} attempts", MAX_ATTEMPTS);
        Self::generate()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ShortId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ShortId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub fn is_well_formed(value: &str) -> bool {
    value.len() == SHORT_ID_LEN && value.chars().all(|ch| SHORT_ID_ALPHABET.contains(ch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_well_formed() {
        for _ in 0..200 {
            let id = ShortId::generate();
            assert!(is_well_formed(id.as_str()), "bad id {id}");
        }
    }

    #[test]
    fn generate_unique_skips_taken_ids() {
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = ShortId::generate_unique(|candidate| seen.contains(candidate));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn lowercase_is_not_well_formed() {
        assert!(!is_well_formed("abc123"));
        assert!(!is_well_formed("ABC12"));
        assert!(is_well_formed("ABC123"));
    }
}
