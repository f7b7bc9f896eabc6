// src/lib.rs

pub mod bridge;
pub mod config;
pub mod core;

// Re-export
pub use crate::bridge::{
    Bridge, CommandDispatcher, Connection, ConnectionRegistry, RegistrationState, SweeperTask,
};
pub use crate::config::BridgeConfig;
pub use crate::core::{BridgeError, Command, Response};
