// src/bridge/connection.rs

//! One persistent, registered backend connection per user identity, and the
//! actor task that exclusively owns its transport.
//!
//! The actor is the only execution context that ever touches the socket, the
//! framing buffer, or the pending slot, so none of that state needs a lock.
//! Handles communicate with it over channels; the legacy protocol has no
//! correlation identifier, so the single pending slot is the correlation
//! mechanism: whatever response arrives next answers the command in flight.

use crate::bridge::handshake::{self, RegistrationState};
use crate::bridge::registry::RegistryInner;
use crate::config::BridgeConfig;
use crate::core::commands::Command;
use crate::core::errors::BridgeError;
use crate::core::protocol::{LineCodec, Response};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A dispatch handed to the connection actor.
struct DispatchRequest {
    command: Command,
    timeout: Duration,
    reply: oneshot::Sender<Result<Response, BridgeError>>,
}

/// The one outstanding command/deferred-result pair a connection can hold.
struct PendingRequest {
    reply: oneshot::Sender<Result<Response, BridgeError>>,
    timeout: Duration,
    deadline: Instant,
}

/// Cloneable handle to a registered backend connection.
///
/// At most one command may be in flight per connection; a second overlapping
/// dispatch is rejected with `ConnectionBusy` rather than queued.
#[derive(Clone, Debug)]
pub struct Connection {
    identity: String,
    conn_id: Uuid,
    request_tx: mpsc::Sender<DispatchRequest>,
    state_rx: watch::Receiver<RegistrationState>,
    shutdown_tx: broadcast::Sender<()>,
    in_flight: Arc<AtomicBool>,
}

impl Connection {
    /// Opens a transport to the backend, drives the registration handshake to
    /// completion, and spawns the actor task. Returns only once the
    /// connection is `Registered` (or fails trying).
    pub(crate) async fn establish(
        identity: &str,
        config: &BridgeConfig,
        registry: Weak<RegistryInner>,
    ) -> Result<Self, BridgeError> {
        let addr = config.backend_addr();
        let (state_tx, state_rx) = watch::channel(RegistrationState::Connecting);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BridgeError::ConnectTimeout(config.connect_timeout))??;

        let mut framed = Framed::new(stream, LineCodec::new(config.max_receive_buffer));
        let _ = state_tx.send(RegistrationState::AwaitingWelcome);
        debug!("Connection for '{identity}' opened to {addr}, awaiting welcome.");

        tokio::time::timeout(
            config.handshake_timeout,
            handshake::drive(&mut framed, identity, &state_tx),
        )
        .await
        .map_err(|_| {
            BridgeError::Registration(format!(
                "handshake timed out after {:?}",
                config.handshake_timeout
            ))
        })??;

        info!("Connection for '{identity}' registered with backend at {addr}.");

        // Capacity 1 is all the in-flight flag ever allows into the channel.
        let (request_tx, request_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let conn_id = Uuid::new_v4();

        let actor = ConnectionActor {
            identity: identity.to_string(),
            conn_id,
            framed,
            request_rx,
            shutdown_rx,
            state_tx,
            in_flight: in_flight.clone(),
            registry,
            pending: None,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            identity: identity.to_string(),
            conn_id,
            request_tx,
            state_rx,
            shutdown_tx,
            in_flight,
        })
    }

    /// The user key this connection is bound to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Identifier distinguishing successive connections for one identity.
    pub fn id(&self) -> Uuid {
        self.conn_id
    }

    pub fn registration_state(&self) -> RegistrationState {
        *self.state_rx.borrow()
    }

    pub fn is_registered(&self) -> bool {
        self.registration_state() == RegistrationState::Registered
    }

    pub fn is_closed(&self) -> bool {
        self.registration_state() == RegistrationState::Closed
    }

    /// Writes one framed command and waits for the response that answers it.
    /// Exactly one of {response, timeout, connection error} settles the call.
    pub(crate) async fn dispatch(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, BridgeError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::ConnectionBusy(self.identity.clone()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = DispatchRequest {
            command,
            timeout,
            reply: reply_tx,
        };
        if self.request_tx.send(request).await.is_err() {
            self.in_flight.store(false, Ordering::Release);
            return Err(BridgeError::ConnectionClosed);
        }

        // The actor settles every accepted request exactly once; a dropped
        // reply channel means it died before it could.
        reply_rx
            .await
            .unwrap_or(Err(BridgeError::ConnectionClosed))
    }

    /// Signals the actor to close the transport and exit.
    pub(crate) fn close(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// What the actor loop should do after handling an event.
enum NextAction {
    Continue,
    Disconnect,
}

/// The task-side half of a connection. Exclusively owns the transport.
struct ConnectionActor {
    identity: String,
    conn_id: Uuid,
    framed: Framed<TcpStream, LineCodec>,
    request_rx: mpsc::Receiver<DispatchRequest>,
    shutdown_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<RegistrationState>,
    in_flight: Arc<AtomicBool>,
    registry: Weak<RegistryInner>,
    pending: Option<PendingRequest>,
}

impl ConnectionActor {
    async fn run(mut self) {
        'main_loop: loop {
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;

                _ = self.shutdown_rx.recv() => {
                    debug!("Connection for '{}' received shutdown signal.", self.identity);
                    break 'main_loop;
                }

                // A new dispatch is only accepted while no slot is pending.
                request = self.request_rx.recv(), if self.pending.is_none() => {
                    match request {
                        Some(request) => {
                            if let NextAction::Disconnect = self.start_request(request).await {
                                break 'main_loop;
                            }
                        }
                        // Every handle is gone; nothing can reach this connection anymore.
                        None => break 'main_loop,
                    }
                }

                () = tokio::time::sleep_until(
                    self.pending.as_ref().map_or_else(Instant::now, |p| p.deadline)
                ), if self.pending.is_some() => {
                    self.expire_pending();
                }

                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(line)) => self.handle_line(&line),
                        Some(Err(e)) => {
                            warn!("Connection for '{}' transport error: {e}", self.identity);
                            break 'main_loop;
                        }
                        None => {
                            debug!("Connection for '{}' closed by backend.", self.identity);
                            break 'main_loop;
                        }
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Serializes the command onto the wire and arms the deadline.
    async fn start_request(&mut self, request: DispatchRequest) -> NextAction {
        debug!(
            "Connection '{}' sending {} (timeout {:?}).",
            self.identity,
            request.command.kind(),
            request.timeout
        );
        if let Err(e) = self.framed.send(request.command).await {
            warn!("Connection '{}' failed to write command: {e}", self.identity);
            self.in_flight.store(false, Ordering::Release);
            let _ = request.reply.send(Err(e));
            return NextAction::Disconnect;
        }
        self.pending = Some(PendingRequest {
            reply: request.reply,
            timeout: request.timeout,
            deadline: Instant::now() + request.timeout,
        });
        NextAction::Continue
    }

    /// Routes one framed line. With a pending slot populated, any response
    /// settles it; without one, the response cannot be attributed to anything
    /// and is dropped.
    fn handle_line(&mut self, line: &str) {
        match serde_json::from_str::<Response>(line) {
            Ok(response) => match self.pending.take() {
                Some(pending) => {
                    self.in_flight.store(false, Ordering::Release);
                    let _ = pending.reply.send(Ok(response));
                }
                None => {
                    debug!(
                        "Connection '{}' dropping unsolicited line: {line}",
                        self.identity
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Connection '{}' dropping unparseable line ({e}): {line}",
                    self.identity
                );
            }
        }
    }

    /// Fails the pending slot with `Timeout` and discards the receive buffer:
    /// a response arriving late is no longer attributable to anything.
    fn expire_pending(&mut self) {
        self.framed.read_buffer_mut().clear();
        if let Some(pending) = self.pending.take() {
            warn!(
                "Connection '{}' command timed out after {:?}.",
                self.identity, pending.timeout
            );
            self.in_flight.store(false, Ordering::Release);
            let _ = pending.reply.send(Err(BridgeError::Timeout(pending.timeout)));
        }
    }

    /// Final cleanup: fail anything still waiting, close the transport, and
    /// remove this connection's own registry entry (the sweeper is only a
    /// safety net behind this path).
    async fn teardown(mut self) {
        let _ = self.state_tx.send(RegistrationState::Closed);

        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(BridgeError::ConnectionClosed));
        }
        self.request_rx.close();
        while let Ok(request) = self.request_rx.try_recv() {
            let _ = request.reply.send(Err(BridgeError::ConnectionClosed));
        }
        self.in_flight.store(false, Ordering::Release);

        let _ = self.framed.close().await;

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_current(&self.identity, self.conn_id);
        }
        info!("Connection for '{}' closed.", self.identity);
    }
}
