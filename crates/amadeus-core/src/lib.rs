//! Core real-time room engine for Amadeus, a multiplayer music-guessing
//! game: the Room state machine, its WebSocket wire protocol, timers, and
//! the registries that tie connections to rooms.
//!
//! The HTTP surface, the song catalog/downloader, and front-end rendering
//! are external collaborators referenced only through the thin traits in
//! [`quiz`] and [`session`]; this crate owns none of them.

pub mod error;
pub mod player_link;
pub mod protocol;
pub mod quiz;
pub mod registry;
mod room;
pub mod runtime;
pub mod session;
pub mod timer;

pub use error::{AmadeusError, AmadeusResult};
pub use player_link::{handle_room_socket, PlayerLink};
pub use protocol::{ClientCommand, CloseReason, PlayerInfo, RoomConfiguration, RoomId, RoomStatus, ServerCommand, SessionId};
pub use quiz::{AudioHandle, Question, Quiz, SongLibrary};
pub use registry::{RoomListing, RoomRegistry};
pub use room::RoomHandle;
pub use session::{InMemorySessionDirectory, SessionDirectory};
