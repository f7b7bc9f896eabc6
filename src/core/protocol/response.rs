// src/core/protocol/response.rs

//! The inbound response shape of the backend protocol.

use serde::{Deserialize, Serialize};

/// One backend response line: `{"success": bool, "message": string, "data"?: any}`.
///
/// The protocol carries no correlation identifier; a response is attributed to
/// whichever command is pending on the connection it arrived on. `message`
/// doubles as the carrier for the handshake sentinels during registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
