pub mod broadcast;
pub mod metrics;
pub mod net;
pub mod persistence;
pub mod protocol;
pub mod session_registry;
pub mod settings;
pub mod state;
pub mod ticker;
