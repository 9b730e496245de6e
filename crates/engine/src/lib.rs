//! State stores for the digsite sandbox server.
//!
//! Everything here is plain, synchronous data: the world (tile overlay,
//! dropped and placed items, clock), player profiles, and world config. The
//! server crate owns sharing, networking, and persistence.

pub mod config;
pub mod ids;
pub mod inventory;
pub mod players;
pub mod world;
