//! Timer service (C5): cancellable one-shot timers that deliver a message
//! into a mailbox.
//!
//! Grounded in the teacher's hierarchical-cancellation idiom
//! (`WsConnectionManager`/`ConnectionGuard` in `api/ws_connection.rs`):
//! each timer gets its own `CancellationToken`, and `cancel()` is
//! idempotent and best-effort — a message already in the mailbox is not
//! recalled. Callers (the controller) guard against stale deliveries by
//! checking the round carried in the message itself.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled timer. Dropping this does *not* cancel the timer —
/// call [`TimerHandle::cancel`] explicitly, matching the spec's "cancel()
/// is idempotent and best-effort" contract rather than RAII-cancel-on-drop
/// (the controller routinely lets old handles go out of scope once a round
/// advances, without wanting that to race a just-fired timer).
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Schedules `message` to be sent on `mailbox` after `duration`, unless
/// cancelled first. Runs on the process-wide Tokio scheduler; the spawned
/// task does nothing but sleep and enqueue (§4.5: timers "MUST NOT execute
/// user code except to enqueue the message").
pub fn schedule<M>(duration: Duration, mailbox: mpsc::UnboundedSender<M>, message: M) -> TimerHandle
where
    M: Send + 'static,
{
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                let _ = mailbox.send(message);
            }
            _ = child.cancelled() => {}
        }
    });
    TimerHandle { cancel }
}
