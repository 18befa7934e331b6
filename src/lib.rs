// Public API for integration tests and library usage

pub mod api;
pub mod config;
pub mod hub;
pub mod protocol;
pub mod room;
pub mod transport;
pub mod types;
