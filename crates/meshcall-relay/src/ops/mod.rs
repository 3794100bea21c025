//! Operational HTTP endpoints and background upkeep.
//!
//! - `/healthz` : liveness
//! - `spawn_session_sweeper` : periodic purge of expired session records

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{http::StatusCode, response::IntoResponse};
use tokio::task::JoinHandle;

use crate::store::{epoch_secs, MemorySessionStore};

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub fn spawn_session_sweeper(store: Arc<MemorySessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let removed = store.purge_expired(epoch_secs(SystemTime::now()));
            if removed > 0 {
                tracing::info!(removed, remaining = store.len(), "expired sessions purged");
            }
        }
    })
}
