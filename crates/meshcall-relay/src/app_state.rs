//! Shared application state for the relay process.
//!
//! Builds the session store, the connection registry and the relay from a
//! validated config. Startup errors are returned, not panicked.

use std::sync::Arc;

use meshcall_core::error::Result;

use crate::config::RelayConfig;
use crate::delivery::{ConnectionGateway, ConnectionRegistry};
use crate::location::{CachingLocator, GeoLocator, StaticLocator};
use crate::relay::Relay;
use crate::store::{MemorySessionStore, SessionStore};

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<RelayConfig>,
    store: Arc<MemorySessionStore>,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<Relay>,
}

impl AppState {
    pub fn new(cfg: RelayConfig) -> Result<Self> {
        cfg.validate()?;

        let store = Arc::new(MemorySessionStore::new());
        let registry = Arc::new(ConnectionRegistry::new(cfg.relay.delivery_timeout()));
        let locator: Arc<dyn GeoLocator> =
            Arc::new(CachingLocator::new(StaticLocator::new(cfg.location_table())));

        let relay = Relay::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&registry) as Arc<dyn ConnectionGateway>,
            locator,
            cfg.relay.session_ttl(),
        );

        tracing::info!(
            locations = cfg.locations.len(),
            session_ttl_secs = cfg.relay.session_ttl_secs,
            "relay state ready"
        );

        Ok(Self {
            cfg: Arc::new(cfg),
            store,
            registry,
            relay: Arc::new(relay),
        })
    }

    pub fn cfg(&self) -> &RelayConfig {
        &self.cfg
    }

    pub fn store(&self) -> Arc<MemorySessionStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }
}
