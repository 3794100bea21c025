use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use meshcall_core::error::{MeshError, Result};
use meshcall_core::protocol::Location;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    #[serde(default)]
    pub relay: RelaySection,

    /// Static geolocation table keyed by source address.
    #[serde(default)]
    pub locations: HashMap<String, Location>,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::UnsupportedVersion);
        }

        self.relay.validate()?;

        for ip in self.locations.keys() {
            ip.parse::<IpAddr>().map_err(|_| {
                MeshError::BadRequest(format!("locations key is not an ip address: {ip}"))
            })?;
        }
        Ok(())
    }

    /// Location table with parsed keys. Call after `validate`.
    pub fn location_table(&self) -> HashMap<IpAddr, Location> {
        self.locations
            .iter()
            .filter_map(|(k, v)| k.parse::<IpAddr>().ok().map(|ip| (ip, v.clone())))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Lifetime of a session record, aligned with the transport idle limit.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            session_ttl_secs: default_session_ttl_secs(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RelaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            MeshError::BadRequest("relay.listen must be a valid socket address".into())
        })?;
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(MeshError::BadRequest(
                "relay.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(MeshError::BadRequest(
                "relay.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(MeshError::BadRequest(
                "relay.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(MeshError::BadRequest("relay.session_ttl_secs must be positive".into()));
        }
        if !(50..=30000).contains(&self.delivery_timeout_ms) {
            return Err(MeshError::BadRequest(
                "relay.delivery_timeout_ms must be between 50 and 30000".into(),
            ));
        }
        if !(1024..=1048576).contains(&self.max_frame_bytes) {
            return Err(MeshError::BadRequest(
                "relay.max_frame_bytes must be between 1024 and 1048576".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(MeshError::BadRequest("relay.sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
// two hours, the managed websocket connection limit
fn default_session_ttl_secs() -> u64 {
    7200
}
fn default_delivery_timeout_ms() -> u64 {
    1500
}
fn default_max_frame_bytes() -> usize {
    65536
}
fn default_sweep_interval_secs() -> u64 {
    300
}
