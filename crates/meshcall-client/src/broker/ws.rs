use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};

use meshcall_core::error::{MeshError, Result};
use meshcall_core::protocol::{decode_frame, Envelope, Frame, Message};

use crate::broker::BrokerHandle;
use crate::config::ClientConfig;
use crate::session::SessionConfig;

/// Inbound envelopes buffered between the socket and the manager.
const INBOUND_QUEUE: usize = 256;

enum SessionEnd {
    /// Every handle or the inbound receiver is gone.
    Shutdown,
    /// Socket dropped; reconnect.
    Lost,
}

/// Websocket connection to the relay.
///
/// On every (re)connect the broker announces itself with `discover` before
/// flushing queued envelopes, keeps the socket alive with periodic `ping`,
/// and swallows the relay's keep-alive replies and malformed frames.
pub struct WsBroker {
    config: ClientConfig,
    session: SessionConfig,
}

impl WsBroker {
    /// Start the connection task.
    ///
    /// Returns the send handle, the stream of envelopes from peers, and the
    /// task handle. The task exits once all send handles are dropped or
    /// the inbound receiver is closed.
    pub fn spawn(
        config: ClientConfig,
        session: SessionConfig,
    ) -> (BrokerHandle, mpsc::Receiver<Envelope>, JoinHandle<()>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);
        let handle = BrokerHandle::new(session.clone(), out_tx);
        let broker = WsBroker { config, session };
        let task = tokio::spawn(broker.run(out_rx, in_tx));
        (handle, in_rx, task)
    }

    async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<Envelope>,
        inbound: mpsc::Sender<Envelope>,
    ) {
        loop {
            match self.connect_once(&mut outbound, &inbound).await {
                Ok(SessionEnd::Shutdown) => {
                    info!(room_id = %self.session.room_id, "broker shutting down");
                    return;
                }
                Ok(SessionEnd::Lost) => {
                    info!(room_id = %self.session.room_id, "relay connection lost");
                }
                Err(e) => {
                    warn!(error = %e, url = %self.config.relay_url, "relay connect failed");
                }
            }
            sleep(self.config.reconnect_delay()).await;
        }
    }

    fn stamp(&self, to_id: &str, message: Message) -> Envelope {
        Envelope::new(
            self.session.room_id.clone(),
            self.session.attendee_id.clone(),
            Some(to_id.to_string()),
            message,
        )
    }

    async fn connect_once(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<Envelope>,
        inbound: &mpsc::Sender<Envelope>,
    ) -> Result<SessionEnd> {
        let (ws, _) = connect_async(self.config.relay_url.as_str())
            .await
            .map_err(|e| MeshError::Delivery(format!("connect failed: {e}")))?;
        let (mut write, mut read) = ws.split();

        let discover = self.stamp(
            &self.session.room_id,
            Message::Discover {
                session_id: Some(self.session.session_id.clone()),
            },
        );
        write
            .send(WsMessage::Text(discover.encode()?))
            .await
            .map_err(|e| MeshError::Delivery(format!("discover send failed: {e}")))?;
        info!(room_id = %self.session.room_id, attendee_id = %self.session.attendee_id, "joined relay");

        let every = self.config.ping_interval();
        let mut ping = interval_at(Instant::now() + every, every);

        loop {
            tokio::select! {
                out = outbound.recv() => {
                    let Some(env) = out else {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    };
                    let text = match env.encode() {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(error = %e, msg_type = env.message.type_name(), "dropping unencodable envelope");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        warn!(error = %e, msg_type = env.message.type_name(), "send failed; envelope lost");
                        return Ok(SessionEnd::Lost);
                    }
                }

                _ = ping.tick() => {
                    let text = self.stamp(&self.session.attendee_id, Message::Ping).encode()?;
                    if write.send(WsMessage::Text(text)).await.is_err() {
                        return Ok(SessionEnd::Lost);
                    }
                }

                frame = read.next() => {
                    match frame {
                        None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => {
                            return Ok(SessionEnd::Lost);
                        }
                        Some(Ok(WsMessage::Text(text))) => match decode_frame(&text) {
                            Ok(Frame::KeepAlive) => trace!("keep-alive"),
                            Ok(Frame::Envelope(env)) => {
                                if inbound.send(env).await.is_err() {
                                    return Ok(SessionEnd::Shutdown);
                                }
                            }
                            Err(e) => debug!(error = %e, "dropping malformed frame"),
                        },
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }
}
