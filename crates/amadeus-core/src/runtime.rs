//! Task spawning abstraction (A2).
//!
//! The controller must never block on disk/network (§5): quiz loading and
//! audio reads run on short-lived helper tasks that post their result back
//! into the controller's mailbox. This trait keeps that spawning decoupled
//! from a concrete Tokio handle, the same seam the teacher uses to let the
//! desktop app and standalone server share service code under different
//! runtimes.

use std::future::Future;

pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task. The task runs independently
    /// of the caller; this trait gives no way to cancel or join it, by
    /// design — cancellation is expressed at the message-passing/timer
    /// level instead (see [`crate::timer`]).
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner using a runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the current runtime's handle.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime context.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = Arc::clone(&executed);

        spawner.spawn(async move {
            executed_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(executed.load(Ordering::SeqCst));
    }
}
