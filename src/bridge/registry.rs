// src/bridge/registry.rs

//! The mapping from user identity to live backend connection.
//!
//! An identity maps to at most one live connection. Creation is serialized
//! per identity: a second caller arriving while the first is still
//! connecting waits on the same entry and reuses the finished connection
//! instead of opening a duplicate transport.

use crate::bridge::connection::Connection;
use crate::config::BridgeConfig;
use crate::core::errors::BridgeError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A registry entry: the per-identity creation lock around the connection.
type RegistrySlot = Arc<Mutex<Option<Connection>>>;

/// Cloneable handle to the shared identity → connection map.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    config: BridgeConfig,
    entries: DashMap<String, RegistrySlot>,
}

impl ConnectionRegistry {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                entries: DashMap::new(),
            }),
        }
    }

    /// Returns the identity's live registered connection, creating and
    /// registering one if none exists. Reuse never opens a new transport.
    pub async fn get_or_create(&self, identity: &str) -> Result<Connection, BridgeError> {
        let slot = self
            .inner
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Per-identity creation lock; concurrent callers for one identity
        // serialize here rather than racing to open duplicate transports.
        let mut guard = slot.lock().await;
        if let Some(connection) = guard.as_ref() {
            if connection.is_registered() {
                return Ok(connection.clone());
            }
        }

        match Connection::establish(identity, &self.inner.config, Arc::downgrade(&self.inner)).await
        {
            Ok(connection) => {
                *guard = Some(connection.clone());
                Ok(connection)
            }
            Err(e) => {
                // Leave no entry behind for an identity that never connected.
                *guard = None;
                drop(guard);
                self.inner.entries.remove_if(identity, |_, s| {
                    Arc::ptr_eq(s, &slot) && s.try_lock().map(|g| g.is_none()).unwrap_or(false)
                });
                Err(e)
            }
        }
    }

    /// Force-closes the identity's transport and removes the entry.
    /// Idempotent if no entry exists.
    pub async fn disconnect(&self, identity: &str) {
        match self.inner.entries.remove(identity) {
            Some((_, slot)) => {
                let guard = slot.lock().await;
                if let Some(connection) = guard.as_ref() {
                    connection.close();
                    info!("Disconnected '{identity}'.");
                }
            }
            None => debug!("disconnect('{identity}'): no live entry."),
        }
    }

    /// Removes entries whose connection is already closed. Pure safety net;
    /// normal teardown is event-driven (a dying connection removes its own
    /// entry). Entries locked for creation and open-but-idle connections are
    /// left untouched.
    pub fn sweep(&self) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(connection) => !connection.is_closed(),
                None => true,
            },
            Err(_) => true,
        });
        before.saturating_sub(self.inner.entries.len())
    }

    /// Number of live entries, for observability. An entry locked for
    /// creation counts as live.
    pub fn count(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| match entry.value().try_lock() {
                Ok(guard) => guard.as_ref().is_some_and(|c| !c.is_closed()),
                Err(_) => true,
            })
            .count()
    }

    /// Closes every connection and clears the map.
    pub(crate) async fn close_all(&self) {
        let slots: Vec<RegistrySlot> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.entries.clear();
        for slot in slots {
            let guard = slot.lock().await;
            if let Some(connection) = guard.as_ref() {
                connection.close();
            }
        }
    }
}

impl RegistryInner {
    /// Event-driven removal: a connection's actor calls this as it exits so
    /// the entry disappears the moment the transport dies. Guarded by the
    /// connection id so a dead task never evicts its replacement.
    pub(crate) fn remove_if_current(&self, identity: &str, conn_id: Uuid) {
        let removed = self.entries.remove_if(identity, |_, slot| {
            slot.try_lock()
                .map(|guard| guard.as_ref().is_some_and(|c| c.id() == conn_id))
                .unwrap_or(false)
        });
        if removed.is_some() {
            debug!("Removed registry entry for '{identity}' ({conn_id}).");
        }
    }
}
