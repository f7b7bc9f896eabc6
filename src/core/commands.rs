// src/core/commands.rs

//! The closed set of commands the bridge can issue against the backend,
//! and their wire serialization.

use crate::core::errors::BridgeError;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

/// An outbound backend command. Serializes to one tagged JSON object per
/// line, e.g. `{"command":"MSG_USER","recipient":"bob","message":"hi"}`.
///
/// The parameter keys are camelCase on the wire, matching what the legacy
/// backend expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(
    tag = "command",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Register { username: String },
    MsgUser { recipient: String, message: String },
    MsgGroup { group_name: String, message: String },
    CreateGroup { group_name: String },
    JoinGroup { group_name: String },
    ListGroups,
    ViewHistory { other_user: String },
    ViewGroupHistory { group_name: String },
    ListUsers,
}

impl Command {
    /// The wire name of this command kind, for logging.
    pub fn kind(&self) -> &str {
        self.as_ref()
    }

    /// Rejects commands whose required identifier parameters are empty.
    /// Message bodies are passed through untouched; their semantics belong to
    /// the backend.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self {
            Command::Register { username } => require_field(self, "username", username),
            Command::MsgUser { recipient, .. } => require_field(self, "recipient", recipient),
            Command::MsgGroup { group_name, .. }
            | Command::CreateGroup { group_name }
            | Command::JoinGroup { group_name }
            | Command::ViewGroupHistory { group_name } => {
                require_field(self, "groupName", group_name)
            }
            Command::ViewHistory { other_user } => require_field(self, "otherUser", other_user),
            Command::ListGroups | Command::ListUsers => Ok(()),
        }
    }
}

fn require_field(command: &Command, field: &'static str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::InvalidCommand(format!(
            "{} requires a non-empty '{field}'",
            command.kind()
        )));
    }
    Ok(())
}
