// src/config.rs

//! Manages bridge configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Operational parameters the bridge core accepts.
///
/// Loaded from a TOML file; every field has a default so a partial (or empty)
/// file is valid.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BridgeConfig {
    /// Host of the legacy chat backend.
    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    /// Port of the legacy chat backend.
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// Deadline applied to a command when the caller does not supply one.
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,

    /// Deadline for establishing the TCP connection itself.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Deadline for the whole welcome/register exchange on a new connection.
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,

    /// Ceiling on buffered, unframed receive bytes per connection. Past this,
    /// the buffer is discarded wholesale and framing resumes from empty.
    #[serde(default = "default_max_receive_buffer")]
    pub max_receive_buffer: usize,

    /// How often the sweeper reclaims registry entries whose transport
    /// already closed.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// Tracing filter for consumers that take their log level from this config.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}
fn default_backend_port() -> u16 {
    5050
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_max_receive_buffer() -> usize {
    64 * 1024 // 64 KB
}
fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend_host: default_backend_host(),
            backend_port: default_backend_port(),
            command_timeout: default_command_timeout(),
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
            max_receive_buffer: default_max_receive_buffer(),
            sweep_interval: default_sweep_interval(),
            log_level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: BridgeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the serde layer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.backend_host.trim().is_empty() {
            return Err(anyhow!("backend_host must not be empty"));
        }
        if self.backend_port == 0 {
            return Err(anyhow!("backend_port must not be 0"));
        }
        if self.command_timeout.is_zero() {
            return Err(anyhow!("command_timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than zero"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(anyhow!("handshake_timeout must be greater than zero"));
        }
        if self.max_receive_buffer == 0 {
            return Err(anyhow!("max_receive_buffer must be greater than zero"));
        }
        if self.sweep_interval.is_zero() {
            return Err(anyhow!("sweep_interval must be greater than zero"));
        }
        Ok(())
    }

    /// `host:port` of the backend, as fed to `TcpStream::connect`.
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }
}
