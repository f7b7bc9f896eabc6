// src/bridge/handshake.rs

//! The registration handshake a fresh connection walks through before it can
//! carry commands, and the sentinel predicates that drive it.
//!
//! The legacy backend signals handshake phases with fixed text fragments
//! inside the `message` field rather than a structured field. The exact
//! phrases must be preserved verbatim for interoperability; they are kept
//! behind the narrow predicates below so a future structured-field backend
//! can be swapped in without touching the state machine.

use crate::core::commands::Command;
use crate::core::errors::BridgeError;
use crate::core::protocol::{LineCodec, Response};
use futures::{SinkExt, StreamExt};
use strum_macros::AsRefStr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Fragment of `message` that identifies the backend's greeting.
const WELCOME_SENTINEL: &str = "Welcome to the chat server";
/// Fragment of `message` that confirms a completed registration.
const REGISTRATION_CONFIRMED_SENTINEL: &str = "Registration successful";

/// Where a connection stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    Connecting,
    AwaitingWelcome,
    Registering,
    Registered,
    Closed,
}

fn is_welcome(response: &Response) -> bool {
    response.message.contains(WELCOME_SENTINEL)
}

fn is_registration_confirmed(response: &Response) -> bool {
    response.message.contains(REGISTRATION_CONFIRMED_SENTINEL)
}

/// Drives the transport from `AwaitingWelcome` to `Registered`, publishing
/// each transition on `state_tx`.
///
/// On the welcome sentinel a `REGISTER` command carrying `identity` is sent
/// immediately; the confirmation sentinel completes the handshake. An
/// explicit failure response at any point before `Registered` aborts with
/// `RegistrationError`. Lines that are neither sentinels nor failures are
/// backend noise and ignored.
pub(crate) async fn drive<T>(
    framed: &mut Framed<T, LineCodec>,
    identity: &str,
    state_tx: &watch::Sender<RegistrationState>,
) -> Result<(), BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let response = next_response(framed, identity).await?;
        let state = *state_tx.borrow();
        match state {
            RegistrationState::AwaitingWelcome if is_welcome(&response) => {
                debug!("Connection '{identity}': welcome received, registering.");
                let _ = state_tx.send(RegistrationState::Registering);
                framed
                    .send(Command::Register {
                        username: identity.to_string(),
                    })
                    .await?;
            }
            RegistrationState::Registering
                if response.success && is_registration_confirmed(&response) =>
            {
                debug!("Connection '{identity}': registration confirmed.");
                let _ = state_tx.send(RegistrationState::Registered);
                return Ok(());
            }
            _ if !response.success => {
                return Err(BridgeError::Registration(response.message));
            }
            _ => {
                debug!(
                    "Connection '{identity}': ignoring line during {}: {}",
                    state.as_ref(),
                    response.message
                );
            }
        }
    }
}

/// Reads frames until one parses as a `Response`, dropping unparseable lines.
async fn next_response<T>(
    framed: &mut Framed<T, LineCodec>,
    identity: &str,
) -> Result<Response, BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match framed.next().await {
            Some(Ok(line)) => match serde_json::from_str::<Response>(&line) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Connection '{identity}': dropping unparseable handshake line ({e}): {line}");
                }
            },
            Some(Err(e)) => return Err(e),
            None => return Err(BridgeError::ConnectionClosed),
        }
    }
}
