//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS and mint a connection handle per socket
//! - Register the socket's outbound queue so the relay can push to it
//! - Feed `$connect`, `$default` and `$disconnect` events to the relay
//! - Lifecycle: ping/pong + idle timeout
//!
//! Text frames of one socket are handled in arrival order, one at a time, so
//! a sender's messages reach each recipient in send order. Different sockets
//! run concurrently.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use meshcall_core::error::Result;

use crate::app_state::AppState;
use crate::delivery::Connection;
use crate::relay::RelayRequest;
use crate::transport::codec::{decode, Inbound};

const OUTBOUND_QUEUE: usize = 256;
const IDLE_CHECK_EVERY: Duration = Duration::from_millis(250);
/// Frames over `max_frame_bytes` are dropped by the codec; frames over this
/// multiple of it end the socket at the protocol layer.
const HARD_FRAME_FACTOR: usize = 4;

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let hard_limit = app.cfg().relay.max_frame_bytes.saturating_mul(HARD_FRAME_FACTOR);
    ws.max_message_size(hard_limit)
        .on_upgrade(move |socket| async move {
            let connection_id = Uuid::new_v4().to_string();
            let span = tracing::info_span!("ws", connection = %connection_id, peer = %peer);
            if let Err(e) = run_session(app, connection_id, peer.ip(), socket)
                .instrument(span)
                .await
            {
                tracing::warn!(code = e.client_code().as_str(), error = %e, "session ended with error");
            }
        })
}

// --------------------
// Core session loop
// --------------------
async fn run_session(app: AppState, connection_id: String, ip: IpAddr, socket: WebSocket) -> Result<()> {
    let relay = app.relay();
    let registry = app.registry();
    let cfg = &app.cfg().relay;

    // ---- outbound channel, registered as this socket's handle
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    registry.insert(connection_id.clone(), Connection { tx: out_tx.clone() });
    tracing::info!(seq = ?registry.seq_of(&connection_id), "socket open");

    relay
        .handle(RelayRequest::connect(connection_id.clone(), Some(ip)))
        .await?;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // ---- timers
    let ping_every = Duration::from_millis(cfg.ping_interval_ms);
    let idle_timeout = Duration::from_millis(cfg.idle_timeout_ms);

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle_tick = tokio::time::interval(IDLE_CHECK_EVERY);
    idle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                let Some(m) = maybe_out else { break; };
                if ws_tx.send(m).await.is_err() {
                    break;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };

                last_activity = Instant::now();

                let inbound = match decode(msg, cfg.max_frame_bytes) {
                    Ok(i) => i,
                    Err(e) => {
                        tracing::debug!(error = %e, "frame dropped");
                        continue;
                    }
                };

                match inbound {
                    Inbound::Text(body) => {
                        let req = RelayRequest::message(connection_id.clone(), Some(ip), body);
                        if let Err(e) = relay.handle(req).await {
                            tracing::warn!(code = e.client_code().as_str(), error = %e, "relay invocation failed");
                        }
                    }
                    Inbound::Binary { bytes_len } => {
                        tracing::debug!(bytes_len, "binary frame ignored");
                    }
                    Inbound::Ping(payload) => {
                        let _ = out_tx.try_send(Message::Pong(payload));
                    }
                    Inbound::Pong => {}
                    Inbound::Close => break,
                }
            }

            // ping
            _ = ping_tick.tick() => {
                let _ = out_tx.try_send(Message::Ping(Vec::new()));
            }

            // idle timeout
            _ = idle_tick.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::info!("idle timeout");
                    break;
                }
            }
        }
    }

    registry.remove(&connection_id);
    tracing::info!("socket closed");
    relay
        .handle(RelayRequest::disconnect(connection_id, Some(ip)))
        .await
}
