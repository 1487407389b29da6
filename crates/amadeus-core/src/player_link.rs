//! PlayerLink (C2): the per-connection actor that owns one WebSocket.
//!
//! Grounded in the teacher's `api/ws.rs` `handle_ws` loop (tokio::select!
//! over cancellation/incoming frames/heartbeat) and its `StreamGuard`
//! RAII-on-drop idiom, adapted from a process-wide broadcast fan-out to a
//! per-socket bounded mpsc so a `SONG_DATA` text frame and its binary
//! payload can never be interleaved with another send on the same link
//! (§4.4.4, P4). The room controller is the only *mutator* of room state,
//! but it is not the only thing that sends to a link: each round's audio
//! fetch runs on its own short-lived background task (§4.4.4, §5), and a
//! rejoin resend is another such task, so two of these can legitimately be
//! in flight against the same `PlayerLink` at once. `send_song_data` holds
//! an internal lock across its announcement and payload frames so those
//! two tasks' sends still can't interleave on the wire.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{ClientCommand, CloseReason, RoomId, ServerCommand, SessionId};
use crate::registry::RoomRegistry;
use crate::room::ControllerMessage;

/// Bound on a single link's outbound queue (§5 backpressure). A client
/// reading slower than this fills its queue; further sends are rejected
/// rather than left to block the controller indefinitely on one slow
/// socket (§5: "the controller must never block indefinitely on a single
/// slow client").
const OUTBOUND_CAPACITY: usize = 64;

enum OutboundFrame {
    Text(String),
    Binary(Bytes),
}

/// Handle to a connected WebSocket, held by the room controller. Sending
/// through it is always best-effort: a full or closed channel just means
/// the link is already dead, dying, or too slow to keep up, which the
/// controller learns about properly via the matching `ClosedConnection`
/// message once the writer task tears the socket down.
pub struct PlayerLink {
    outbound: mpsc::Sender<OutboundFrame>,
    /// Serializes every enqueue onto `outbound`. A single `send` only ever
    /// holds this for one frame, but `send_song_data` holds it across both
    /// its announcement and payload frames — otherwise two concurrently
    /// spawned streaming tasks targeting the same link (e.g. a rejoin
    /// resend racing the next round's background fetch) could interleave
    /// their Text/Binary pairs and break the "frame immediately following
    /// SONG_DATA is its payload" contract (§4.4.4, P4).
    send_lock: tokio::sync::Mutex<()>,
    /// Separate, single-slot channel for close requests so a close can
    /// always be delivered even when `outbound` is saturated by a slow
    /// reader — the writer loop polls this with priority over `outbound`.
    close: mpsc::Sender<CloseReason>,
}

impl PlayerLink {
    fn new(outbound: mpsc::Sender<OutboundFrame>, close: mpsc::Sender<CloseReason>) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            send_lock: tokio::sync::Mutex::new(()),
            close,
        })
    }

    /// Sends a server command as a text frame. Returns `false` if the link
    /// is gone or its outbound queue is full (backpressure overflow);
    /// callers must not treat that as a hard error beyond logging, though
    /// broadcast callers close the link in response (§5).
    pub async fn send(&self, cmd: &ServerCommand) -> bool {
        let Some(frame) = Self::encode(cmd) else {
            return false;
        };
        let _guard = self.send_lock.lock().await;
        self.try_enqueue(frame)
    }

    /// Sends the `SONG_DATA` announcement immediately followed by the
    /// binary payload (§4.4.4). The lock is held across both enqueues, so
    /// no other call to `send`/`send_song_data` on this link — including
    /// one racing in from a different task — can land a frame between the
    /// announcement and its payload.
    pub async fn send_song_data(&self, round: u32, bytes: Bytes) -> bool {
        let announce = ServerCommand::SongData {
            round,
            size_bytes: bytes.len(),
        };
        let Some(frame) = Self::encode(&announce) else {
            return false;
        };
        let _guard = self.send_lock.lock().await;
        if !self.try_enqueue(frame) {
            return false;
        }
        self.try_enqueue(OutboundFrame::Binary(bytes))
    }

    fn encode(cmd: &ServerCommand) -> Option<OutboundFrame> {
        match serde_json::to_string(cmd) {
            Ok(text) => Some(OutboundFrame::Text(text)),
            Err(err) => {
                log::warn!("[PlayerLink] failed to encode server command: {}", err);
                None
            }
        }
    }

    /// Must be called with `send_lock` held.
    fn try_enqueue(&self, frame: OutboundFrame) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("[PlayerLink] outbound queue full, treating as overflow");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Requests the link close with the given reason. Best-effort: if the
    /// link is already gone or a close is already queued this is a no-op.
    pub async fn close(&self, reason: CloseReason) {
        let _ = self.close.try_send(reason);
    }

    /// Identity comparison used by the controller to deduplicate
    /// `ClosedConnection` against a replacement join for the same session
    /// (§4.4.1): only act if the supplied link is still the current one.
    pub fn is(self: &Arc<Self>, other: &Arc<Self>) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// Drives one accepted WebSocket end to end: registers with the room
/// controller, then shuttles frames until the socket or the controller
/// gives up on it. Spawned once per upgraded connection by the HTTP layer.
pub async fn handle_room_socket(
    socket: WebSocket,
    registry: Arc<RoomRegistry>,
    room_id: RoomId,
    session: SessionId,
) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);
    let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(1);
    let link = PlayerLink::new(outbound_tx, close_tx);

    let writer = tokio::spawn(async move {
        loop {
            // Close requests jump the queue: `outbound` may be saturated by
            // a slow reader, but a close must still get through (§5).
            let frame = tokio::select! {
                biased;
                reason = close_rx.recv() => {
                    if let Some(reason) = reason {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: reason.code(),
                                reason: reason.reason().into(),
                            })))
                            .await;
                    }
                    break;
                }
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let result = match frame {
                OutboundFrame::Text(text) => sink.send(Message::Text(text.into())).await,
                OutboundFrame::Binary(bytes) => sink.send(Message::Binary(bytes)).await,
            };
            if result.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mailbox = registry.mailbox_for(&room_id);

    let (reply_tx, reply_rx) = oneshot::channel();
    if mailbox
        .send(ControllerMessage::IncomingConnection {
            session: session.clone(),
            link: link.clone(),
            reply: reply_tx,
        })
        .is_err()
    {
        link.close(CloseReason::GoingAway).await;
        let _ = writer.await;
        return;
    }

    match reply_rx.await {
        Ok(Some(reason)) => {
            link.close(reason).await;
            let _ = writer.await;
            return;
        }
        Ok(None) => {}
        Err(_) => {
            let _ = writer.await;
            return;
        }
    }

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) => {
                    if mailbox.send(to_controller_message(session.clone(), cmd)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::debug!(
                        "[PlayerLink {}/{}] discarding malformed client frame: {}",
                        room_id,
                        session,
                        err
                    );
                }
            },
            Some(Ok(Message::Binary(_))) => {
                log::debug!(
                    "[PlayerLink {}/{}] discarding unexpected binary frame from client",
                    room_id,
                    session
                );
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                log::debug!("[PlayerLink {}/{}] socket read error: {}", room_id, session, err);
                break;
            }
        }
    }

    let _ = mailbox.send(ControllerMessage::ClosedConnection {
        session,
        link: link.clone(),
    });
    drop(link);
    let _ = writer.await;
}

fn to_controller_message(session: SessionId, cmd: ClientCommand) -> ControllerMessage {
    match cmd {
        ClientCommand::Start => ControllerMessage::Start { session },
        ClientCommand::Next => ControllerMessage::NextRound { session },
        ClientCommand::BufferComplete { round } => ControllerMessage::BufferComplete { session, round },
        ClientCommand::Guess { round, guess } => ControllerMessage::Guess { session, round, guess },
    }
}

/// Test-only harness: a `PlayerLink` backed by an inspectable channel
/// instead of a real socket, for controller tests that need to observe
/// what was sent to a player.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub enum Frame {
        Text(String),
        Binary(Bytes),
        Close(CloseReason),
    }

    pub fn fake_link() -> (Arc<PlayerLink>, mpsc::Receiver<Frame>) {
        let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);
        let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(1);
        let (out_tx, out_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    reason = close_rx.recv() => {
                        if let Some(reason) = reason {
                            let _ = out_tx.send(Frame::Close(reason)).await;
                        }
                        break;
                    }
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        let mapped = match frame {
                            OutboundFrame::Text(t) => Frame::Text(t),
                            OutboundFrame::Binary(b) => Frame::Binary(b),
                        };
                        if out_tx.send(mapped).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        (PlayerLink::new(tx, close_tx), out_rx)
    }
}
