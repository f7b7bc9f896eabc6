// src/core/errors.rs

//! Defines the primary error type for the bridge.

use std::time::Duration;
use thiserror::Error;

/// The main error enum, representing all possible failures within the bridge.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend closed the transport, or the connection's actor task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connecting to the backend timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An inbound line failed to parse as the expected structured format.
    /// Surfaced only for outbound serialization failures; inbound lines that
    /// fail to parse are logged and dropped without failing any caller.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend reported a failure during the registration handshake.
    #[error("Registration failed: {0}")]
    Registration(String),

    /// No matching response arrived within the deadline. Carries the
    /// configured duration.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// A command is already in flight on this identity's connection.
    #[error("A command is already in flight for '{0}'")]
    ConnectionBusy(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Timeout must be greater than zero")]
    InvalidTimeout,
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Protocol(e.to_string())
    }
}
