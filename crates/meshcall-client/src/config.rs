//! Client config loader (strict parsing).

use std::fs;
use std::time::Duration;

use serde::Deserialize;

use meshcall_core::error::{MeshError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    /// Relay websocket endpoint, e.g. `wss://relay.example/v1/ws`.
    pub relay_url: String,

    /// Room to join. Empty starts a fresh room.
    #[serde(default)]
    pub room_id: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// How long the flip leader waits for a connection before flipping roles.
    #[serde(default = "default_stuck_timeout_ms")]
    pub stuck_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_ping_interval_ms() -> u64 {
    60_000
}
fn default_stuck_timeout_ms() -> u64 {
    10_000
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}

impl ClientConfig {
    /// Config with defaults for everything but the relay address.
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            version: 1,
            relay_url: relay_url.into(),
            room_id: String::new(),
            ping_interval_ms: default_ping_interval_ms(),
            stuck_timeout_ms: default_stuck_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .map_err(|e| MeshError::Internal(format!("read config failed: {e}")))?;
        Self::load_from_str(&s)
    }

    pub fn load_from_str(s: &str) -> Result<Self> {
        let cfg: ClientConfig = serde_yaml::from_str(s)
            .map_err(|e| MeshError::BadRequest(format!("invalid yaml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::UnsupportedVersion);
        }
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(MeshError::BadRequest(format!(
                "relay_url must be a ws:// or wss:// url: {}",
                self.relay_url
            )));
        }
        if !(1_000..=600_000).contains(&self.ping_interval_ms) {
            return Err(MeshError::BadRequest(
                "ping_interval_ms must be 1000..=600000".into(),
            ));
        }
        if !(500..=120_000).contains(&self.stuck_timeout_ms) {
            return Err(MeshError::BadRequest(
                "stuck_timeout_ms must be 500..=120000".into(),
            ));
        }
        if !(100..=60_000).contains(&self.reconnect_delay_ms) {
            return Err(MeshError::BadRequest(
                "reconnect_delay_ms must be 100..=60000".into(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn stuck_timeout(&self) -> Duration {
        Duration::from_millis(self.stuck_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
