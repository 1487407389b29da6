//! Internal, controller-private room state (§3 "Internal state"). Never
//! shared outside the controller task; `to_status` is the only window
//! onto it the rest of the process gets, via a published snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::player_link::PlayerLink;
use crate::protocol::{PlayerInfo, RoomConfiguration, RoomStatus, SessionId};
use crate::quiz::Quiz;
use crate::timer::TimerHandle;

/// Internal phase marker. Carries only what distinguishes phases from
/// each other; round-specific presentation data is derived from
/// `RoomState` when building a [`RoomStatus`] snapshot.
pub(crate) enum Phase {
    Lobby,
    Loading,
    Buffering { round: u32 },
    Playing { round: u32, round_start: i64 },
    Reviewing { round: u32 },
    Finished,
}

pub(crate) struct RoomState {
    pub config: RoomConfiguration,
    pub phase: Phase,
    pub quiz: Option<Quiz>,

    /// Insertion order, oldest first. Used only to derive a stable
    /// `players` ordering; host identity is tracked separately in `host`.
    pub join_order: Vec<SessionId>,
    pub connected: HashMap<SessionId, Arc<PlayerLink>>,
    pub committed: BTreeSet<SessionId>,
    pub names: HashMap<SessionId, String>,
    pub host: Option<SessionId>,

    /// Rounds each session has confirmed buffering for.
    pub buffer_status: HashMap<SessionId, HashSet<u32>>,
    pub scores: BTreeMap<SessionId, i32>,
    pub guesses: BTreeMap<SessionId, String>,
    pub correct: BTreeSet<SessionId>,

    /// Rounds for which an audio stream has already been kicked off, so a
    /// rejoin doesn't re-trigger the Buffering-entry/Playing-entry stream
    /// a second time for everyone (resends for a single rejoining link
    /// are handled separately).
    pub streamed_rounds: HashSet<u32>,

    pub round_timer: Option<TimerHandle>,
    pub review_timer: Option<TimerHandle>,
}

impl RoomState {
    pub fn new(config: RoomConfiguration) -> Self {
        Self {
            config,
            phase: Phase::Lobby,
            quiz: None,
            join_order: Vec::new(),
            connected: HashMap::new(),
            committed: BTreeSet::new(),
            names: HashMap::new(),
            host: None,
            buffer_status: HashMap::new(),
            scores: BTreeMap::new(),
            guesses: BTreeMap::new(),
            correct: BTreeSet::new(),
            streamed_rounds: HashSet::new(),
            round_timer: None,
            review_timer: None,
        }
    }

    pub fn is_host(&self, session: &SessionId) -> bool {
        self.host.as_ref() == Some(session)
    }

    pub fn current_round(&self) -> Option<u32> {
        match self.phase {
            Phase::Buffering { round } | Phase::Playing { round, .. } | Phase::Reviewing { round } => Some(round),
            Phase::Lobby | Phase::Loading | Phase::Finished => None,
        }
    }

    /// Players shown in a published snapshot: anyone currently connected
    /// or still committed (P1) — a committed player who has temporarily
    /// dropped their socket stays visible so the room doesn't look empty
    /// mid-disconnect.
    fn visible_players(&self) -> Vec<PlayerInfo> {
        self.join_order
            .iter()
            .filter(|id| self.connected.contains_key(*id) || self.committed.contains(*id))
            .map(|id| PlayerInfo {
                id: id.clone(),
                name: self.names.get(id).cloned().unwrap_or_else(|| format!("player-{id}")),
                host: self.is_host(id),
            })
            .collect()
    }

    pub fn to_status(&self) -> RoomStatus {
        let players = self.visible_players();
        match &self.phase {
            Phase::Lobby => RoomStatus::Lobby { players },
            Phase::Loading => RoomStatus::Loading { players },
            Phase::Buffering { round } => RoomStatus::Buffering {
                players,
                round: *round,
                ready: self
                    .committed
                    .iter()
                    .filter(|id| self.buffer_status.get(*id).is_some_and(|rounds| rounds.contains(round)))
                    .cloned()
                    .collect(),
                scores: self.scores.clone(),
            },
            Phase::Playing { round, round_start } => RoomStatus::Playing {
                players,
                round: *round,
                round_start: *round_start,
                prompt: self
                    .quiz
                    .as_ref()
                    .and_then(|q| q.question(*round))
                    .map(|q| q.prompt.clone())
                    .unwrap_or_default(),
                guessed: self.guesses.keys().cloned().collect(),
                scores: self.scores.clone(),
            },
            Phase::Reviewing { round } => {
                let question = self.quiz.as_ref().and_then(|q| q.question(*round));
                RoomStatus::Reviewing {
                    players,
                    round: *round,
                    prompt: question.map(|q| q.prompt.clone()).unwrap_or_default(),
                    solution: question.map(|q| q.solution.clone()).unwrap_or_default(),
                    guesses: self.guesses.clone(),
                    correct: self.correct.clone(),
                    scores: self.scores.clone(),
                }
            }
            Phase::Finished => RoomStatus::Finished {
                players,
                scores: self.scores.clone(),
            },
        }
    }
}

/// Exact case-insensitive trimmed equality (§4.4.5, open question 1 pinned).
pub(crate) fn answers_match(guess: &str, solution: &str) -> bool {
    guess.trim().to_lowercase() == solution.trim().to_lowercase()
}
