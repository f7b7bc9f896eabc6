// src/core/mod.rs

//! Core protocol types shared across the bridge: commands, responses,
//! line framing, and the crate error type.

pub mod commands;
pub mod errors;
pub mod protocol;

pub use commands::Command;
pub use errors::BridgeError;
pub use protocol::{LineCodec, Response};
