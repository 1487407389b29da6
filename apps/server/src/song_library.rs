//! Fixture `SongLibrary` (§6 "HTTP adjuncts"): a minimal, explicitly
//! non-durable stand-in for the SQLite-backed catalog and audio-downloader
//! the core spec places out of scope (spec.md §1). Enough to run the room
//! engine end to end; not the production catalog.
//!
//! Grounded in the teacher's `SonosClient` trait-object seam: a thin async
//! trait with one production-shaped implementation swapped out here for a
//! manifest-driven fixture, the way the teacher's own tests swap in fakes
//! for `SonosClient` rather than hitting real speakers.

use std::path::PathBuf;
use std::sync::Arc;

use amadeus_core::{AmadeusError, AmadeusResult, AudioHandle, Question, Quiz, RoomConfiguration, SongLibrary};
use async_trait::async_trait;
use bytes::Bytes;
use rand::seq::SliceRandom;
use serde::Deserialize;

/// One row of the manifest file: a prompt/solution pair and the on-disk
/// path to the audio clip to stream for it.
#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    audio_path: PathBuf,
    prompt: String,
    solution: String,
}

enum Source {
    /// Audio bytes live on disk, read per-question on demand.
    Manifest(Vec<ManifestEntry>),
    /// Self-contained demo questions with embedded placeholder bytes, used
    /// when no manifest is configured so the server runs out of the box.
    Builtin,
}

/// Fixture `SongLibrary` backed either by a JSON manifest of on-disk audio
/// files or, lacking one, a handful of built-in demo questions.
pub struct FixtureSongLibrary {
    source: Source,
}

impl FixtureSongLibrary {
    /// Loads a manifest from `path` (a JSON array of
    /// `{audioPath, prompt, solution}` objects).
    pub fn from_manifest(path: &std::path::Path) -> AmadeusResult<Arc<Self>> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| AmadeusError::Internal(format!("reading song manifest {}: {err}", path.display())))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&content)
            .map_err(|err| AmadeusError::Internal(format!("parsing song manifest {}: {err}", path.display())))?;
        if entries.is_empty() {
            return Err(AmadeusError::Internal(format!("song manifest {} has no entries", path.display())));
        }
        Ok(Arc::new(Self {
            source: Source::Manifest(entries),
        }))
    }

    /// Built-in demo fixture: no external files required.
    pub fn builtin() -> Arc<Self> {
        Arc::new(Self { source: Source::Builtin })
    }
}

const BUILTIN_QUESTIONS: &[(&str, &str, &str)] = &[
    ("demo-0", "A knight who links the first flame", "Firelink Shrine"),
    ("demo-1", "Opening theme of a certain plumber's platformer", "Super Mario Bros"),
    ("demo-2", "A minimalist techno label from Berlin", "Ostgut Ton"),
    ("demo-3", "Four-on-the-floor, 1977, disco", "I Feel Love"),
    ("demo-4", "The loneliest number", "One"),
];

#[async_trait]
impl SongLibrary for FixtureSongLibrary {
    async fn load_quiz(&self, config: &RoomConfiguration) -> AmadeusResult<Quiz> {
        let rounds = config.rounds as usize;
        let mut questions: Vec<Question> = match &self.source {
            Source::Manifest(entries) => entries
                .iter()
                .map(|entry| Question {
                    audio: AudioHandle(entry.audio_path.display().to_string()),
                    prompt: entry.prompt.clone(),
                    solution: entry.solution.clone(),
                })
                .collect(),
            Source::Builtin => BUILTIN_QUESTIONS
                .iter()
                .map(|(audio, prompt, solution)| Question {
                    audio: AudioHandle::from(*audio),
                    prompt: prompt.to_string(),
                    solution: solution.to_string(),
                })
                .collect(),
        };

        let mut rng = rand::thread_rng();
        questions.shuffle(&mut rng);
        questions.truncate(rounds.max(1).min(questions.len().max(1)));

        Ok(Quiz { questions })
    }

    async fn audio_bytes(&self, handle: &AudioHandle) -> AmadeusResult<Bytes> {
        match &self.source {
            Source::Manifest(_) => {
                let bytes = tokio::fs::read(&handle.0)
                    .await
                    .map_err(|err| AmadeusError::AudioRead(format!("{}: {err}", handle.0)))?;
                Ok(Bytes::from(bytes))
            }
            Source::Builtin => {
                // No real audio shipped with the fixture; a short, clearly
                // synthetic payload is enough to exercise the SONG_DATA +
                // binary-frame wire protocol end to end.
                Ok(Bytes::from(format!("amadeus-demo-clip:{}", handle.0)))
            }
        }
    }
}
