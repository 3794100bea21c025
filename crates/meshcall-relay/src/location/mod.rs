//! Geolocation of participants by source address.
//!
//! The lookup service itself is external; the relay only consumes
//! `GeoLocator`. `StaticLocator` serves a fixed table from config and
//! `CachingLocator` memoizes any locator per address, since one client's
//! address is looked up on every discover and acknowledge.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use dashmap::DashMap;

use meshcall_core::error::Result;
use meshcall_core::protocol::Location;

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<Option<Location>>;
}

/// Fixed address -> location table.
#[derive(Debug, Default, Clone)]
pub struct StaticLocator {
    table: HashMap<IpAddr, Location>,
}

impl StaticLocator {
    pub fn new(table: HashMap<IpAddr, Location>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl GeoLocator for StaticLocator {
    async fn locate(&self, ip: IpAddr) -> Result<Option<Location>> {
        Ok(self.table.get(&ip).cloned())
    }
}

pub struct CachingLocator<L> {
    inner: L,
    cache: DashMap<IpAddr, Option<Location>>,
}

impl<L: GeoLocator> CachingLocator<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<L: GeoLocator> GeoLocator for CachingLocator<L> {
    async fn locate(&self, ip: IpAddr) -> Result<Option<Location>> {
        if let Some(hit) = self.cache.get(&ip) {
            return Ok(hit.value().clone());
        }
        // errors are not cached; the next call retries the lookup
        let found = self.inner.locate(ip).await?;
        self.cache.insert(ip, found.clone());
        Ok(found)
    }
}
