// src/bridge/dispatcher.rs

//! Issues commands against per-identity connections and returns the one
//! response that answers each of them.

use crate::bridge::registry::ConnectionRegistry;
use crate::core::commands::Command;
use crate::core::errors::BridgeError;
use crate::core::protocol::Response;
use std::time::Duration;

/// Front door for callers: validates a command, resolves the identity's
/// connection through the registry (creating it on demand), and runs one
/// request/response exchange under a deadline.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: ConnectionRegistry,
    default_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: ConnectionRegistry, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    /// Sends `command` on `identity`'s connection and waits up to `timeout`
    /// for the response.
    ///
    /// Exactly one of {response, timeout, connection error} settles the call.
    /// A second call for the same identity while one is outstanding fails
    /// fast with `ConnectionBusy`.
    pub async fn send(
        &self,
        identity: &str,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, BridgeError> {
        if timeout.is_zero() {
            return Err(BridgeError::InvalidTimeout);
        }
        command.validate()?;

        let connection = self.registry.get_or_create(identity).await?;
        connection.dispatch(command, timeout).await
    }

    /// `send` with the configured default command timeout.
    pub async fn send_with_default(
        &self,
        identity: &str,
        command: Command,
    ) -> Result<Response, BridgeError> {
        self.send(identity, command, self.default_timeout).await
    }
}
