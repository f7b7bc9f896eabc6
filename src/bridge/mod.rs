// src/bridge/mod.rs

//! The connection/correlation subsystem: per-identity persistent connections,
//! command dispatch, and dead-connection reclamation.

// Declare the sub-modules of the `bridge` module.
mod connection;
mod dispatcher;
mod handshake;
mod registry;
mod sweeper;

// Publicly re-export the primary types from the sub-modules.
pub use connection::Connection;
pub use dispatcher::CommandDispatcher;
pub use handshake::RegistrationState;
pub use registry::ConnectionRegistry;
pub use sweeper::SweeperTask;

use crate::config::BridgeConfig;
use crate::core::commands::Command;
use crate::core::errors::BridgeError;
use crate::core::protocol::Response;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wires the registry, dispatcher, and sweeper together and exposes the
/// surface an adapter consumes: `send`, `disconnect`, and the live
/// connection count.
pub struct Bridge {
    registry: ConnectionRegistry,
    dispatcher: CommandDispatcher,
    shutdown_tx: broadcast::Sender<()>,
}

impl Bridge {
    /// Builds the bridge and spawns its background sweeper. Must be called
    /// from within a tokio runtime.
    pub fn new(config: BridgeConfig) -> Self {
        let registry = ConnectionRegistry::new(config.clone());
        let dispatcher = CommandDispatcher::new(registry.clone(), config.command_timeout);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(SweeperTask::new(registry.clone(), config.sweep_interval).run(shutdown_rx));

        Self {
            registry,
            dispatcher,
            shutdown_tx,
        }
    }

    /// Runs one command for `identity` under `timeout`, creating and
    /// registering the identity's connection on demand.
    pub async fn send(
        &self,
        identity: &str,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, BridgeError> {
        self.dispatcher.send(identity, command, timeout).await
    }

    /// `send` with the configured default command timeout.
    pub async fn send_with_default(
        &self,
        identity: &str,
        command: Command,
    ) -> Result<Response, BridgeError> {
        self.dispatcher.send_with_default(identity, command).await
    }

    /// Force-closes the identity's connection. Idempotent.
    pub async fn disconnect(&self, identity: &str) {
        self.registry.disconnect(identity).await;
    }

    /// Number of live connections, for observability.
    pub fn active_connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Stops the sweeper and closes every live connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.registry.close_all().await;
    }
}
