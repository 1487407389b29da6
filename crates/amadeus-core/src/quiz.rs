//! Quiz (C3): an immutable list of questions loaded via a [`SongLibrary`].
//!
//! The core never inspects audio bytes or the catalog that produced them —
//! it only asks a `SongLibrary` for a quiz and, per question, for the bytes
//! to stream. The real catalog (SQLite-backed, downloader-populated) is
//! explicitly out of scope (spec §1); this trait is the thin seam the
//! out-of-scope collaborator plugs into, grounded in the teacher's
//! `SonosClient`/`Transcoder` trait-object seams for swappable backends.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AmadeusResult;
use crate::protocol::RoomConfiguration;

/// Opaque reference to a playable audio clip. The core treats this as a
/// bag of bytes once resolved; format is opaque to the engine (front-end
/// decodes it).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioHandle(pub String);

impl From<&str> for AudioHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One question: the audio to stream, the prompt shown to players, and the
/// solution scored against guesses.
#[derive(Debug, Clone)]
pub struct Question {
    pub audio: AudioHandle,
    pub prompt: String,
    pub solution: String,
}

/// Immutable list of questions for one game (§3). Never mutated once loaded.
#[derive(Debug, Clone, Default)]
pub struct Quiz {
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, round: u32) -> Option<&Question> {
        self.questions.get(round as usize)
    }
}

/// The external collaborator that resolves a quiz and streams audio bytes.
///
/// Implementations are free to read through a SQLite catalog and an
/// audio-downloader cache (the production shape) or, for tests/dev, serve a
/// fixed in-memory table. The core only relies on this trait.
#[async_trait]
pub trait SongLibrary: Send + Sync {
    /// Loads the quiz for a room, selecting `config.rounds` questions.
    async fn load_quiz(&self, config: &RoomConfiguration) -> AmadeusResult<Quiz>;

    /// Reads the full audio byte sequence for a handle. May block briefly
    /// on disk/network; callers MUST execute this off the room's controller
    /// task (see [`crate::runtime::TaskSpawner`]).
    async fn audio_bytes(&self, handle: &AudioHandle) -> AmadeusResult<Bytes>;
}
