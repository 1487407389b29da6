//! The RoomController mailbox (§4.4.1).

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::AmadeusResult;
use crate::player_link::PlayerLink;
use crate::protocol::{CloseReason, SessionId};
use crate::quiz::Quiz;

/// Every way the outside world (or the controller's own background tasks
/// and timers) communicates with a room. Processed strictly FIFO by the
/// single controller task that owns the room (§5).
pub enum ControllerMessage {
    /// A PlayerLink requesting admission. `reply` must be completed
    /// exactly once: `None` means accepted, `Some(reason)` means the
    /// caller must close the socket with that reason.
    IncomingConnection {
        session: SessionId,
        link: Arc<PlayerLink>,
        reply: oneshot::Sender<Option<CloseReason>>,
    },
    /// A link has gone away. Only acted on if `link` is still the current
    /// link for `session` — a replacement join may already have arrived.
    ClosedConnection { session: SessionId, link: Arc<PlayerLink> },
    /// Host request to leave Lobby.
    Start { session: SessionId },
    /// The background quiz loader finished (successfully or not).
    LoadingComplete(AmadeusResult<Quiz>),
    /// Host-forced phase advance.
    NextRound { session: SessionId },
    BufferComplete { session: SessionId, round: u32 },
    Guess { session: SessionId, round: u32, guess: String },
    /// From the timer service; ignored if `round` is no longer current.
    RoundTimeout { round: u32 },
    ReviewTimeout { round: u32 },
}
