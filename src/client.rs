//! Per-connection client record and its pump pair.
//!
//! Each connection runs exactly two tasks: a reader pump that decodes
//! inbound frames and hands them to the hub, and a writer pump that drains
//! the client's mailbox and sends periodic keepalive pings. The pumps share
//! nothing beyond the split socket halves and the mailbox.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::hub::HubHandle;
use crate::message::Message;

/// Maximum inbound message size in bytes, enforced at the upgrade.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Capacity of the per-client outbound mailbox. A client that falls this
/// far behind is treated as a slow consumer and evicted by the hub.
pub const MAILBOX_CAPACITY: usize = 2;

const WRITE_WAIT: Duration = Duration::from_secs(10);
const PING_PERIOD: Duration = Duration::from_secs(60);
const PONG_MARGIN: Duration = Duration::from_secs(10);

/// Deadlines and periods for the pump pair.
///
/// `pong_wait` must exceed `ping_period` by a safety margin so a single
/// delayed pong does not kill a healthy connection.
#[derive(Debug, Clone, Copy)]
pub struct PumpTimings {
    /// Time allowed for one outbound write.
    pub write_wait: Duration,
    /// Period between keepalive pings.
    pub ping_period: Duration,
    /// Liveness window renewed on every pong.
    pub pong_wait: Duration,
}

impl Default for PumpTimings {
    fn default() -> Self {
        Self {
            write_wait: WRITE_WAIT,
            ping_period: PING_PERIOD,
            pong_wait: PING_PERIOD + PONG_MARGIN,
        }
    }
}

/// Server-side record of one connected participant. The hub's table owns
/// this value; dropping it closes the mailbox, which is the writer pump's
/// exit signal.
pub struct Client {
    /// Connection identity, compared by the hub on unregister so a stale
    /// reader cannot remove a newer connection with the same nickname.
    pub id: Uuid,
    /// Unique key in the hub table, immutable for the connection's lifetime.
    pub nickname: String,
    /// Sender half of the bounded outbound mailbox.
    pub mailbox: mpsc::Sender<Message>,
}

impl Client {
    /// Create a client record and the mailbox receiver its writer pump
    /// will drain.
    pub fn new(nickname: String) -> (Self, mpsc::Receiver<Message>) {
        let (mailbox, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let client = Client {
            id: Uuid::new_v4(),
            nickname,
            mailbox,
        };

        (client, mailbox_rx)
    }
}

/// Reader pump: decode inbound frames and forward them to the hub.
///
/// Keeps a liveness deadline that only pongs renew; a peer that stays
/// silent past `pong_wait` is treated as dead. Whatever the exit path,
/// the pump signals `unregister` before releasing its socket half.
pub async fn read_pump(
    mut socket: SplitStream<WebSocket>,
    hub: HubHandle,
    nickname: String,
    id: Uuid,
    timings: PumpTimings,
) {
    let mut deadline = Instant::now() + timings.pong_wait;

    loop {
        let frame = tokio::select! {
            frame = socket.next() => frame,
            _ = time::sleep_until(deadline) => {
                tracing::warn!("client '{}' missed its keepalive window", nickname);
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                let mut message: Message = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("can't decode message from '{}': {}", nickname, e);
                        break;
                    }
                };

                // The relayed payload always carries the registered
                // nickname, whatever the peer claimed.
                message.nickname = Some(nickname.clone());

                if hub.broadcast(message).await.is_err() {
                    break;
                }
            }
            Some(Ok(WsMessage::Binary(_))) => {
                tracing::warn!("client '{}' sent a binary frame", nickname);
                break;
            }
            Some(Ok(WsMessage::Pong(payload))) => {
                tracing::debug!("pong from '{}': {:?}", nickname, payload);
                deadline = Instant::now() + timings.pong_wait;
            }
            Some(Ok(WsMessage::Ping(_))) => {
                // Answered by the protocol layer.
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Err(e)) => {
                // Abnormal closure surfaces here rather than as a close frame.
                tracing::warn!("can't read from client '{}': {}", nickname, e);
                break;
            }
        }
    }

    // Single authoritative removal trigger for read-side failure; the hub
    // ignores it if this instance was already evicted or shadowed.
    if hub.unregister(nickname, id).await.is_err() {
        tracing::debug!("hub already gone during unregister");
    }
}

/// Writer pump: drain the mailbox and send keepalive pings.
///
/// Exits cleanly when the hub closes the mailbox, or immediately on any
/// write error or deadline expiry. A write-side failure does not
/// unregister; the reader's liveness deadline takes care of that.
pub async fn write_pump(
    mut socket: SplitSink<WebSocket, WsMessage>,
    mut mailbox: mpsc::Receiver<Message>,
    timings: PumpTimings,
) {
    let mut ticker = time::interval_at(Instant::now() + timings.ping_period, timings.ping_period);

    loop {
        tokio::select! {
            received = mailbox.recv() => {
                let Some(message) = received else {
                    // Mailbox closed by the hub: unregistered or evicted.
                    break;
                };

                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!("can't encode message: {}", e);
                        break;
                    }
                };

                if !send_with_deadline(&mut socket, WsMessage::Text(payload.into()), timings.write_wait).await {
                    break;
                }
            }
            _ = ticker.tick() => {
                let ping = WsMessage::Ping(Bytes::from_static(b"Ping"));
                if !send_with_deadline(&mut socket, ping, timings.write_wait).await {
                    break;
                }
            }
        }
    }
}

async fn send_with_deadline(
    socket: &mut SplitSink<WebSocket, WsMessage>,
    frame: WsMessage,
    write_wait: Duration,
) -> bool {
    match time::timeout(write_wait, socket.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("can't write to the socket: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("write deadline of {:?} exceeded", write_wait);
            false
        }
    }
}
