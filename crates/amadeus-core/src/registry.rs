//! RoomRegistry (C6): a process-wide, concurrent room-id → Room mapping
//! with get-or-create semantics, grounded in the teacher's `DashMap`-keyed
//! service pattern (`services/stream_coordinator.rs`'s session map) and
//! its composed-at-startup shape (`bootstrap.rs`).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::{RoomConfiguration, RoomId};
use crate::quiz::SongLibrary;
use crate::room::{self, ControllerMessage, RoomHandle};
use crate::runtime::TaskSpawner;
use crate::session::SessionDirectory;

/// A read-only row for `GET /room` listings (§4.3): never blocks on a
/// room's controller, since it's built entirely from published snapshots.
#[derive(Debug, Clone)]
pub struct RoomListing {
    pub id: RoomId,
    pub connected_count: usize,
    pub max_players: usize,
    pub phase_tag: &'static str,
    pub created_at_ms: i64,
}

pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<RoomHandle>>,
    library: Arc<dyn SongLibrary>,
    sessions: Arc<dyn SessionDirectory>,
    spawner: Arc<dyn TaskSpawner>,
    default_config: RoomConfiguration,
}

impl RoomRegistry {
    /// Creates a registry that spawns every new room with
    /// [`RoomConfiguration::default`]. See [`RoomRegistry::with_default_config`]
    /// to supply a process-wide override (e.g. from a config file).
    pub fn new(
        library: Arc<dyn SongLibrary>,
        sessions: Arc<dyn SessionDirectory>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Arc<Self> {
        Self::with_default_config(library, sessions, spawner, RoomConfiguration::default())
    }

    /// Like [`RoomRegistry::new`], but every room spawned by this registry
    /// starts with `default_config` instead of the library default.
    pub fn with_default_config(
        library: Arc<dyn SongLibrary>,
        sessions: Arc<dyn SessionDirectory>,
        spawner: Arc<dyn TaskSpawner>,
        default_config: RoomConfiguration,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            library,
            sessions,
            spawner,
            default_config,
        })
    }

    /// Returns the room for `id`, creating and spawning its controller if
    /// this is the first upgrade seen for it (§3 Lifecycle, §4.3).
    pub fn get_or_create(self: &Arc<Self>, id: &RoomId) -> Arc<RoomHandle> {
        if let Some(existing) = self.rooms.get(id) {
            return Arc::clone(&existing);
        }

        let registry = Arc::clone(self);
        let room_id = id.clone();
        let entry = self.rooms.entry(id.clone()).or_insert_with(|| {
            let (handle, join) = room::spawn(
                room_id.clone(),
                registry.default_config.clone(),
                Arc::clone(&registry.library),
                Arc::clone(&registry.sessions),
                Arc::clone(&registry.spawner),
            );
            spawn_reaper(Arc::clone(&registry), room_id.clone(), join);
            Arc::new(handle)
        });
        Arc::clone(&entry)
    }

    /// Convenience used by [`crate::player_link`]: get-or-create the room,
    /// then hand back just its mailbox.
    pub fn mailbox_for(self: &Arc<Self>, id: &RoomId) -> mpsc::UnboundedSender<ControllerMessage> {
        self.get_or_create(id).mailbox()
    }

    /// Current listing for every live room, built entirely from volatile
    /// snapshots — never blocks on a controller task (§4.3).
    pub fn list(&self) -> Vec<RoomListing> {
        self.rooms
            .iter()
            .map(|entry| {
                let room = entry.value();
                RoomListing {
                    id: room.id.clone(),
                    connected_count: room.connected_count(),
                    max_players: room.config.read().max_players,
                    phase_tag: room.phase_tag(),
                    created_at_ms: room.created_at_ms,
                }
            })
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn spawn_reaper(registry: Arc<RoomRegistry>, room_id: RoomId, join: tokio::task::JoinHandle<()>) {
    tokio::spawn(async move {
        let _ = join.await;
        registry.rooms.remove(&room_id);
        log::debug!("[Registry] room {} reaped", room_id);
    });
}
