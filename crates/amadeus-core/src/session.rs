//! SessionDirectory (C7): opaque session-id → display-name mapping.
//!
//! Read-only from the core's perspective. The HTTP layer populates this
//! before allowing a client to open a room WebSocket; absent names fall
//! back to `"player-<id>"` (§4.6).

use dashmap::DashMap;

use crate::protocol::SessionId;

/// Resolves a session id to a display name. The in-memory implementation
/// below is sufficient for the single-process deployment the spec assumes;
/// a durable directory is out of scope.
pub trait SessionDirectory: Send + Sync {
    fn name_for(&self, session: &SessionId) -> Option<String>;
}

/// `DashMap`-backed directory, grounded in the teacher's use of `DashMap`
/// for every process-wide concurrent map (`WsConnectionManager`, stream
/// registries).
#[derive(Default)]
pub struct InMemorySessionDirectory {
    names: DashMap<SessionId, String>,
}

impl InMemorySessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or overwrites) the display name for a session.
    pub fn register(&self, session: SessionId, name: String) {
        self.names.insert(session, name);
    }
}

impl SessionDirectory for InMemorySessionDirectory {
    fn name_for(&self, session: &SessionId) -> Option<String> {
        self.names.get(session).map(|entry| entry.clone())
    }
}

/// Resolves a display name for `session`, falling back to `player-<id>`
/// per §4.6 when the directory has no registered name.
pub fn display_name(dir: &dyn SessionDirectory, session: &SessionId) -> String {
    dir.name_for(session)
        .unwrap_or_else(|| format!("player-{}", session.0))
}
