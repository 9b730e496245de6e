pub mod connection;
mod dispatch;
pub mod listener;
