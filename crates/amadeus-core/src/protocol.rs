//! Wire codec (C1): the JSON client/server command envelopes and the
//! `RoomStatus` tagged union, plus the identifiers and configuration types
//! that appear on the wire.
//!
//! Encoding/decoding is just `serde_json` over these types — there is no
//! hand-rolled parsing. Framing (which frames carry which tag, and the
//! text-then-binary pairing for `SONG_DATA`) is enforced by [`crate::player_link`],
//! not by this module.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque room identifier, taken verbatim from the WebSocket path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque session nonce. The only identity the core consumes (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-room configuration (§3). Mutable only while the room is in Lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfiguration {
    /// Seconds the audio snippet plays for before guessing time starts counting.
    pub play_time: u32,
    /// Seconds of guessing time after the snippet plays.
    pub guess_time: u32,
    /// Seconds spent showing the solution before advancing.
    pub review_time: u32,
    /// Total number of rounds (questions) in the quiz.
    pub rounds: u32,
    /// Maximum number of players admitted while in Lobby.
    pub max_players: usize,
}

impl Default for RoomConfiguration {
    fn default() -> Self {
        Self {
            play_time: 20,
            guess_time: 10,
            review_time: 5,
            rounds: 20,
            max_players: 8,
        }
    }
}

impl RoomConfiguration {
    /// Total Playing-phase duration in milliseconds: `(playTime + guessTime) * 1000`.
    pub fn round_duration_ms(&self) -> u64 {
        (self.play_time as u64 + self.guess_time as u64) * 1000
    }

    /// Reviewing-phase duration in milliseconds.
    pub fn review_duration_ms(&self) -> u64 {
        self.review_time as u64 * 1000
    }
}

/// `{id, name, host}` (§3). `host` is true exactly for the first player
/// admitted while the room was in Lobby, for the room's entire lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: SessionId,
    pub name: String,
    pub host: bool,
}

/// Tagged union of room phases (§3). Every variant carries `players`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Lobby {
        players: Vec<PlayerInfo>,
    },
    Loading {
        players: Vec<PlayerInfo>,
    },
    Buffering {
        players: Vec<PlayerInfo>,
        round: u32,
        ready: BTreeSet<SessionId>,
        scores: BTreeMap<SessionId, i32>,
    },
    Playing {
        players: Vec<PlayerInfo>,
        round: u32,
        /// Unix epoch milliseconds.
        round_start: i64,
        prompt: String,
        guessed: BTreeSet<SessionId>,
        scores: BTreeMap<SessionId, i32>,
    },
    Reviewing {
        players: Vec<PlayerInfo>,
        round: u32,
        prompt: String,
        solution: String,
        guesses: BTreeMap<SessionId, String>,
        correct: BTreeSet<SessionId>,
        scores: BTreeMap<SessionId, i32>,
    },
    Finished {
        players: Vec<PlayerInfo>,
        scores: BTreeMap<SessionId, i32>,
    },
}

impl RoomStatus {
    pub fn players(&self) -> &[PlayerInfo] {
        match self {
            Self::Lobby { players }
            | Self::Loading { players }
            | Self::Buffering { players, .. }
            | Self::Playing { players, .. }
            | Self::Reviewing { players, .. }
            | Self::Finished { players, .. } => players,
        }
    }

    /// The round currently being buffered/played/reviewed, if any.
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::Buffering { round, .. }
            | Self::Playing { round, .. }
            | Self::Reviewing { round, .. } => Some(*round),
            Self::Lobby { .. } | Self::Loading { .. } | Self::Finished { .. } => None,
        }
    }
}

/// Client → server commands (§4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    Start,
    Next,
    BufferComplete { round: u32 },
    Guess { round: u32, guess: String },
}

/// Server → client commands (§4.1). `SongData` announces the binary frame
/// that follows immediately on the same socket; see [`crate::player_link`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerCommand {
    RoomConfig { config: RoomConfiguration },
    RoomState { state: RoomStatus },
    SongData { round: u32, size_bytes: usize },
}

/// Close codes used by the core (§6). Numeric values are real WebSocket
/// close codes where one exists (1001/1002/1008); `CANNOT_ACCEPT` has no
/// standard equivalent so it uses an application-defined code in the
/// private-use range (RFC 6455 §7.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ViolatedPolicy,
    CannotAccept,
    GoingAway,
    ProtocolError,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            Self::ViolatedPolicy => 1008,
            Self::CannotAccept => 4000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::ViolatedPolicy => "missing or invalid session",
            Self::CannotAccept => "room not accepting new players",
            Self::GoingAway => "superseded or room terminating",
            Self::ProtocolError => "protocol error",
        }
    }
}
