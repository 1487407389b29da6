//! RoomController (C4): the single-writer actor driving one room's phase
//! state machine (§4.4). Every mutation of room state happens on the task
//! spawned by [`spawn`]; everything else talks to it only by posting a
//! [`ControllerMessage`] or reading the published `config`/`status`
//! snapshots.
//!
//! Grounded in the teacher's actor-with-mailbox shape (`services/stream_coordinator.rs`)
//! and its `parking_lot::RwLock`-published volatile fields (`context.rs`'s
//! `NetworkContext`), generalized from one published value to the room's
//! config/status pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::AmadeusResult;
use crate::player_link::PlayerLink;
use crate::protocol::{CloseReason, RoomConfiguration, RoomId, RoomStatus, ServerCommand, SessionId};
use crate::quiz::{Quiz, SongLibrary};
use crate::room::messages::ControllerMessage;
use crate::room::state::{answers_match, Phase, RoomState};
use crate::runtime::TaskSpawner;
use crate::session::{self, SessionDirectory};
use crate::timer;

/// What the rest of the process is allowed to know about a live room:
/// a way to post messages, and the two published snapshots (§4.4).
pub struct RoomHandle {
    pub id: RoomId,
    mailbox: mpsc::UnboundedSender<ControllerMessage>,
    pub config: Arc<RwLock<RoomConfiguration>>,
    pub status: Arc<RwLock<RoomStatus>>,
    pub connected_count: Arc<AtomicUsize>,
    pub created_at_ms: i64,
}

impl RoomHandle {
    pub fn mailbox(&self) -> mpsc::UnboundedSender<ControllerMessage> {
        self.mailbox.clone()
    }

    pub fn connected_count(&self) -> usize {
        self.connected_count.load(Ordering::Relaxed)
    }

    pub fn phase_tag(&self) -> &'static str {
        phase_tag(&self.status.read())
    }
}

fn phase_tag(status: &RoomStatus) -> &'static str {
    match status {
        RoomStatus::Lobby { .. } => "LOBBY",
        RoomStatus::Loading { .. } => "LOADING",
        RoomStatus::Buffering { .. } => "BUFFERING",
        RoomStatus::Playing { .. } => "PLAYING",
        RoomStatus::Reviewing { .. } => "REVIEWING",
        RoomStatus::Finished { .. } => "FINISHED",
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct RoomController {
    room_id: RoomId,
    state: RoomState,
    mailbox: mpsc::UnboundedSender<ControllerMessage>,
    library: Arc<dyn SongLibrary>,
    sessions: Arc<dyn SessionDirectory>,
    spawner: Arc<dyn TaskSpawner>,
    published_config: Arc<RwLock<RoomConfiguration>>,
    published_status: Arc<RwLock<RoomStatus>>,
    connected_count: Arc<AtomicUsize>,
}

/// Spawns a room's controller task and returns the handle the rest of the
/// process interacts with. Terminates (and the returned join handle
/// resolves) once the room reaches Finished with no connected links left
/// (§4.4.2 "terminate").
pub fn spawn(
    room_id: RoomId,
    config: RoomConfiguration,
    library: Arc<dyn SongLibrary>,
    sessions: Arc<dyn SessionDirectory>,
    spawner: Arc<dyn TaskSpawner>,
) -> (RoomHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let published_config = Arc::new(RwLock::new(config.clone()));
    let published_status = Arc::new(RwLock::new(RoomStatus::Lobby { players: vec![] }));
    let connected_count = Arc::new(AtomicUsize::new(0));

    let mut controller = RoomController {
        room_id: room_id.clone(),
        state: RoomState::new(config),
        mailbox: tx.clone(),
        library,
        sessions,
        spawner,
        published_config: published_config.clone(),
        published_status: published_status.clone(),
        connected_count: connected_count.clone(),
    };

    let join = tokio::spawn(async move {
        controller.run(rx).await;
    });

    let handle = RoomHandle {
        id: room_id,
        mailbox: tx,
        config: published_config,
        status: published_status,
        connected_count,
        created_at_ms: now_ms(),
    };

    (handle, join)
}

impl RoomController {
    async fn run(&mut self, mut mailbox: mpsc::UnboundedReceiver<ControllerMessage>) {
        while let Some(msg) = mailbox.recv().await {
            self.handle(msg).await;
            if matches!(self.state.phase, Phase::Finished) && self.state.connected.is_empty() {
                break;
            }
        }
        self.shut_down().await;
    }

    async fn shut_down(&mut self) {
        if let Some(timer) = self.state.round_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.state.review_timer.take() {
            timer.cancel();
        }
        let links: Vec<Arc<PlayerLink>> = self.state.connected.values().cloned().collect();
        for link in links {
            link.close(CloseReason::GoingAway).await;
        }
        self.state.connected.clear();
        self.connected_count.store(0, Ordering::Relaxed);
        log::info!("[Room {}] terminated", self.room_id);
    }

    async fn handle(&mut self, msg: ControllerMessage) {
        match msg {
            ControllerMessage::IncomingConnection { session, link, reply } => {
                self.handle_incoming(session, link, reply).await
            }
            ControllerMessage::ClosedConnection { session, link } => self.handle_closed(session, link).await,
            ControllerMessage::Start { session } => self.handle_start(session).await,
            ControllerMessage::LoadingComplete(result) => self.handle_loading_complete(result).await,
            ControllerMessage::NextRound { session } => self.handle_next_round(session).await,
            ControllerMessage::BufferComplete { session, round } => self.handle_buffer_complete(session, round).await,
            ControllerMessage::Guess { session, round, guess } => self.handle_guess(session, round, guess).await,
            ControllerMessage::RoundTimeout { round } => self.handle_round_timeout(round).await,
            ControllerMessage::ReviewTimeout { round } => self.handle_review_timeout(round).await,
        }
    }

    async fn handle_incoming(
        &mut self,
        session: SessionId,
        link: Arc<PlayerLink>,
        reply: tokio::sync::oneshot::Sender<Option<CloseReason>>,
    ) {
        let rejected = match self.state.phase {
            Phase::Lobby => {
                !self.state.connected.contains_key(&session)
                    && self.state.connected.len() >= self.state.config.max_players
            }
            _ => !self.state.connected.contains_key(&session) && !self.state.committed.contains(&session),
        };

        if rejected {
            let _ = reply.send(Some(CloseReason::CannotAccept));
            return;
        }

        if let Some(previous) = self.state.connected.remove(&session) {
            if !previous.is(&link) {
                previous.close(CloseReason::GoingAway).await;
            }
        }
        if !self.state.join_order.contains(&session) {
            self.state.join_order.push(session.clone());
        }
        if self.state.host.is_none() && matches!(self.state.phase, Phase::Lobby) {
            self.state.host = Some(session.clone());
        }

        let name = session::display_name(self.sessions.as_ref(), &session);
        self.state.names.insert(session.clone(), name);
        self.state.connected.insert(session.clone(), link.clone());

        let _ = reply.send(None);

        let _ = link
            .send(&ServerCommand::RoomConfig {
                config: self.state.config.clone(),
            })
            .await;
        let _ = link
            .send(&ServerCommand::RoomState {
                state: self.state.to_status(),
            })
            .await;

        if !matches!(self.state.phase, Phase::Lobby | Phase::Loading | Phase::Finished) {
            self.resend_audio_to(link);
        }

        let cmd = self.publish();
        self.broadcast(&cmd, Some(&session)).await;
    }

    async fn handle_closed(&mut self, session: SessionId, link: Arc<PlayerLink>) {
        let still_current = self.state.connected.get(&session).is_some_and(|current| current.is(&link));
        if !still_current {
            return;
        }
        self.state.connected.remove(&session);

        // Losing a not-yet-buffered player can flip the "everyone buffered"
        // condition to true with no further BufferComplete left to trigger
        // it (§4.4.2 Buffering -> Playing), so re-check it here too.
        if let Phase::Buffering { round } = self.state.phase {
            if self.all_committed_connected_buffered(round) {
                self.enter_playing(round).await;
                return;
            }
        }

        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn handle_start(&mut self, session: SessionId) {
        if !self.state.is_host(&session) || !matches!(self.state.phase, Phase::Lobby) {
            return;
        }
        self.state.committed = self.state.connected.keys().cloned().collect();
        self.state.phase = Phase::Loading;

        let library = Arc::clone(&self.library);
        let config = self.state.config.clone();
        let mailbox = self.mailbox.clone();
        self.spawner.spawn(async move {
            let result = library.load_quiz(&config).await;
            let _ = mailbox.send(ControllerMessage::LoadingComplete(result));
        });

        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn handle_loading_complete(&mut self, result: AmadeusResult<Quiz>) {
        if !matches!(self.state.phase, Phase::Loading) {
            return;
        }
        match result {
            Ok(quiz) if !quiz.is_empty() => {
                self.state.quiz = Some(quiz);
                self.state.phase = Phase::Buffering { round: 0 };
                self.spawn_stream(0);
            }
            Ok(_) => {
                log::warn!("[Room {}] quiz loaded with zero questions, finishing room", self.room_id);
                self.state.phase = Phase::Finished;
            }
            Err(err) => {
                log::warn!(
                    "[Room {}] quiz load failed, finishing room with no scores: {}",
                    self.room_id,
                    err
                );
                self.state.phase = Phase::Finished;
            }
        }
        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn handle_next_round(&mut self, session: SessionId) {
        if !self.state.is_host(&session) {
            return;
        }
        match self.state.phase {
            Phase::Buffering { round } => self.enter_playing(round).await,
            Phase::Playing { round, .. } => self.enter_reviewing(round).await,
            Phase::Reviewing { round } => self.advance_from_reviewing(round).await,
            Phase::Lobby | Phase::Loading | Phase::Finished => {}
        }
    }

    async fn handle_buffer_complete(&mut self, session: SessionId, round: u32) {
        if !self.state.committed.contains(&session) {
            return;
        }
        self.state.buffer_status.entry(session).or_default().insert(round);

        if let Phase::Buffering { round: current } = self.state.phase {
            if current == round && self.all_committed_connected_buffered(current) {
                self.enter_playing(current).await;
                return;
            }
        }
        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    fn all_committed_connected_buffered(&self, round: u32) -> bool {
        self.state
            .committed
            .iter()
            .filter(|id| self.state.connected.contains_key(*id))
            .all(|id| self.state.buffer_status.get(id).is_some_and(|rounds| rounds.contains(&round)))
    }

    async fn handle_guess(&mut self, session: SessionId, round: u32, guess: String) {
        let current = match self.state.phase {
            Phase::Playing { round, .. } => round,
            _ => return,
        };
        if current != round || !self.state.committed.contains(&session) {
            return;
        }
        self.state.guesses.insert(session, guess);
        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn handle_round_timeout(&mut self, round: u32) {
        if let Phase::Playing { round: current, .. } = self.state.phase {
            if current == round {
                self.enter_reviewing(round).await;
            }
        }
    }

    async fn handle_review_timeout(&mut self, round: u32) {
        if let Phase::Reviewing { round: current } = self.state.phase {
            if current == round {
                self.advance_from_reviewing(round).await;
            }
        }
    }

    async fn enter_playing(&mut self, round: u32) {
        if let Some(timer) = self.state.round_timer.take() {
            timer.cancel();
        }
        self.state.phase = Phase::Playing {
            round,
            round_start: now_ms(),
        };
        let duration = Duration::from_millis(self.state.config.round_duration_ms());
        self.state.round_timer = Some(timer::schedule(
            duration,
            self.mailbox.clone(),
            ControllerMessage::RoundTimeout { round },
        ));

        if let Some(quiz) = &self.state.quiz {
            if round + 1 < quiz.len() as u32 {
                self.spawn_stream(round + 1);
            }
        }

        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn enter_reviewing(&mut self, round: u32) {
        if let Some(timer) = self.state.round_timer.take() {
            timer.cancel();
        }

        let solution = self.state.quiz.as_ref().and_then(|q| q.question(round)).map(|q| q.solution.clone());
        if let Some(solution) = solution {
            let newly_correct: Vec<SessionId> = self
                .state
                .guesses
                .iter()
                .filter(|(_, guess)| answers_match(guess, &solution))
                .map(|(player, _)| player.clone())
                .collect();
            for player in newly_correct {
                self.state.correct.insert(player.clone());
                *self.state.scores.entry(player).or_insert(0) += 1;
            }
        }

        self.state.phase = Phase::Reviewing { round };
        let duration = Duration::from_millis(self.state.config.review_duration_ms());
        self.state.review_timer = Some(timer::schedule(
            duration,
            self.mailbox.clone(),
            ControllerMessage::ReviewTimeout { round },
        ));

        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    async fn advance_from_reviewing(&mut self, round: u32) {
        if let Some(timer) = self.state.review_timer.take() {
            timer.cancel();
        }

        let total_rounds = self.state.quiz.as_ref().map(|q| q.len() as u32).unwrap_or(0);
        let next = round + 1;

        self.state.guesses.clear();
        self.state.correct.clear();
        self.state.buffer_status.retain(|_, rounds| {
            rounds.retain(|r| *r > round);
            !rounds.is_empty()
        });

        if next < total_rounds {
            self.state.phase = Phase::Buffering { round: next };
            self.spawn_stream(next);
        } else {
            self.state.phase = Phase::Finished;
        }

        let cmd = self.publish();
        self.broadcast(&cmd, None).await;
    }

    /// Kicks off a background read of the audio for `round` and fans the
    /// result out to every connected link (§4.4.4). Idempotent per round:
    /// a rejoin must not re-trigger the original broadcast stream (use
    /// [`RoomController::resend_audio_to`] for that instead).
    fn spawn_stream(&mut self, round: u32) {
        if !self.state.streamed_rounds.insert(round) {
            return;
        }
        let Some(question) = self.state.quiz.as_ref().and_then(|q| q.question(round)).cloned() else {
            return;
        };
        let links: Vec<Arc<PlayerLink>> = self.state.connected.values().cloned().collect();
        let library = Arc::clone(&self.library);
        let room_id = self.room_id.clone();
        self.spawner.spawn(async move {
            match library.audio_bytes(&question.audio).await {
                Ok(bytes) => {
                    for link in links {
                        if !link.send_song_data(round, bytes.clone()).await {
                            link.close(CloseReason::ProtocolError).await;
                        }
                    }
                }
                Err(err) => {
                    log::warn!(
                        "[Room {}] failed to read audio bytes for round {}: {}",
                        room_id,
                        round,
                        err
                    );
                }
            }
        });
    }

    /// Re-streams audio to a single rejoining link for the current round
    /// (and, if Playing, the pre-fetched next round) so it can resume
    /// (§4.4.3).
    fn resend_audio_to(&self, link: Arc<PlayerLink>) {
        let Some(round) = self.state.current_round() else {
            return;
        };
        let mut rounds = vec![round];
        if let (Phase::Playing { .. }, Some(quiz)) = (&self.state.phase, &self.state.quiz) {
            if round + 1 < quiz.len() as u32 {
                rounds.push(round + 1);
            }
        }
        let Some(quiz) = self.state.quiz.clone() else {
            return;
        };
        let library = Arc::clone(&self.library);
        let room_id = self.room_id.clone();
        self.spawner.spawn(async move {
            for r in rounds {
                let Some(question) = quiz.question(r).cloned() else {
                    continue;
                };
                match library.audio_bytes(&question.audio).await {
                    Ok(bytes) => {
                        if !link.send_song_data(r, bytes).await {
                            link.close(CloseReason::ProtocolError).await;
                            break;
                        }
                    }
                    Err(err) => {
                        log::warn!(
                            "[Room {}] failed to resend audio for round {} on rejoin: {}",
                            room_id,
                            r,
                            err
                        );
                    }
                }
            }
        });
    }

    /// Publishes the current status snapshot and returns the `ROOM_STATE`
    /// command to broadcast.
    fn publish(&mut self) -> ServerCommand {
        let status = self.state.to_status();
        *self.published_status.write() = status.clone();
        self.connected_count.store(self.state.connected.len(), Ordering::Relaxed);
        ServerCommand::RoomState { state: status }
    }

    /// Sends `cmd` to every connected link except `except`. A send failure
    /// on one link is logged and does not abort the rest (§5 broadcast
    /// failure policy); the failing link itself is closed, since a failure
    /// here only ever means the link's outbound queue overflowed or it is
    /// already gone — both are the backpressure-overflow case §5 calls
    /// fatal for that one link, not for the broadcast as a whole.
    async fn broadcast(&self, cmd: &ServerCommand, except: Option<&SessionId>) {
        for (session, link) in &self.state.connected {
            if Some(session) == except {
                continue;
            }
            if !link.send(cmd).await {
                log::debug!("[Room {}] broadcast send failed for session {}, closing link", self.room_id, session);
                link.close(CloseReason::ProtocolError).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player_link::test_support::fake_link;
    use crate::quiz::test_support::FixedSongLibrary;
    use crate::runtime::TokioSpawner;
    use crate::session::InMemorySessionDirectory;
    use tokio::sync::oneshot;

    fn test_config() -> RoomConfiguration {
        RoomConfiguration {
            play_time: 1,
            guess_time: 1,
            review_time: 1,
            rounds: 1,
            max_players: 4,
        }
    }

    #[tokio::test]
    async fn single_player_happy_path_reaches_finished_with_score() {
        let library = FixedSongLibrary::new(vec![("a0", "Prompt", "Answer")]);
        let sessions = Arc::new(InMemorySessionDirectory::new());
        sessions.register(SessionId::from("alice"), "Alice".into());
        let spawner = Arc::new(TokioSpawner::current());

        let (handle, _join) = spawn(
            RoomId::from("room-1"),
            test_config(),
            library,
            sessions,
            spawner,
        );

        let (link, mut rx) = fake_link();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox()
            .send(ControllerMessage::IncomingConnection {
                session: SessionId::from("alice"),
                link: link.clone(),
                reply: reply_tx,
            })
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), None);

        handle
            .mailbox()
            .send(ControllerMessage::Start {
                session: SessionId::from("alice"),
            })
            .unwrap();

        // Drain frames until Finished, with a generous timeout since the
        // phases are driven by real (short, 1s) timers in this test.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if tokio::time::Instant::now() > deadline {
                panic!("room did not reach Finished in time");
            }
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(_frame)) => {
                    if matches!(&*handle.status.read(), RoomStatus::Playing { .. }) {
                        handle
                            .mailbox()
                            .send(ControllerMessage::BufferComplete {
                                session: SessionId::from("alice"),
                                round: 0,
                            })
                            .ok();
                        handle
                            .mailbox()
                            .send(ControllerMessage::Guess {
                                session: SessionId::from("alice"),
                                round: 0,
                                guess: "answer".into(),
                            })
                            .ok();
                    }
                }
                Ok(None) => break,
                Err(_) => {}
            }
            if matches!(&*handle.status.read(), RoomStatus::Finished { .. }) {
                break;
            }
        }

        match &*handle.status.read() {
            RoomStatus::Finished { scores, .. } => {
                assert_eq!(scores.get(&SessionId::from("alice")), Some(&1));
            }
            other => panic!("expected Finished, got {:?}", std::mem::discriminant(other)),
        }
    }

    async fn join(handle: &RoomHandle, session: &str) -> (Arc<PlayerLink>, mpsc::Receiver<crate::player_link::test_support::Frame>) {
        let (link, rx) = fake_link();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox()
            .send(ControllerMessage::IncomingConnection {
                session: SessionId::from(session),
                link: link.clone(),
                reply: reply_tx,
            })
            .unwrap();
        let reason = reply_rx.await.unwrap();
        assert_eq!(reason, None, "expected admission for {session}");
        (link, rx)
    }

    fn test_room(rounds: u32) -> (RoomHandle, tokio::task::JoinHandle<()>, Arc<FixedSongLibrary>) {
        let library = FixedSongLibrary::new(vec![("a0", "Prompt", "Firelink Shrine")]);
        let sessions = Arc::new(InMemorySessionDirectory::new());
        let spawner = Arc::new(TokioSpawner::current());
        let config = RoomConfiguration {
            rounds,
            ..test_config()
        };
        let (handle, join) = spawn(RoomId::from("room"), config, library.clone(), sessions, spawner);
        (handle, join, library)
    }

    /// S2 — case/whitespace insensitivity: a padded, differently-cased
    /// guess still scores (§4.4.5).
    #[tokio::test]
    async fn case_and_whitespace_insensitive_guess_scores() {
        let (handle, _join, _library) = test_room(1);
        let (_link, mut rx) = join(&handle, "alice").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        loop {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(_)) => {
                    if matches!(&*handle.status.read(), RoomStatus::Playing { .. }) {
                        handle
                            .mailbox()
                            .send(ControllerMessage::Guess {
                                session: SessionId::from("alice"),
                                round: 0,
                                guess: "  firelink shrine  ".into(),
                            })
                            .unwrap();
                        break;
                    }
                }
                _ => continue,
            }
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !matches!(&*handle.status.read(), RoomStatus::Finished { .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Finished");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        match &*handle.status.read() {
            RoomStatus::Finished { scores, .. } => assert_eq!(scores.get(&SessionId::from("alice")), Some(&1)),
            _ => unreachable!(),
        }
    }

    /// S3 — a guess submitted after the round has moved to Reviewing must
    /// not affect scores (P5).
    #[tokio::test]
    async fn late_guess_during_reviewing_is_ignored() {
        let (handle, _join, _library) = test_room(1);
        let (_link, _rx) = join(&handle, "alice").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !matches!(&*handle.status.read(), RoomStatus::Reviewing { .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Reviewing");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle
            .mailbox()
            .send(ControllerMessage::Guess {
                session: SessionId::from("alice"),
                round: 0,
                guess: "firelink shrine".into(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match &*handle.status.read() {
            RoomStatus::Reviewing { scores, guesses, .. } => {
                assert!(scores.is_empty());
                assert!(guesses.is_empty());
            }
            other => panic!("expected still Reviewing, got {:?}", std::mem::discriminant(other)),
        }
    }

    /// S5 — a third, non-committed client is rejected once the room has
    /// left Lobby (§4.4.3).
    #[tokio::test]
    async fn outsider_is_rejected_once_room_has_started() {
        let (handle, _join, _library) = test_room(1);
        let (_link, _rx) = join(&handle, "alice").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!matches!(&*handle.status.read(), RoomStatus::Lobby { .. }));

        let (link, _rx) = fake_link();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox()
            .send(ControllerMessage::IncomingConnection {
                session: SessionId::from("outsider"),
                link,
                reply: reply_tx,
            })
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), Some(CloseReason::CannotAccept));
    }

    /// S6 — a host NEXT during Playing force-advances to Reviewing and
    /// still scores guesses received so far.
    #[tokio::test]
    async fn host_next_force_advances_playing_to_reviewing() {
        let (handle, _join, _library) = test_room(1);
        let (_link, mut rx) = join(&handle, "alice").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Playing");
            if matches!(&*handle.status.read(), RoomStatus::Playing { .. }) {
                break;
            }
            let _ = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        }

        handle
            .mailbox()
            .send(ControllerMessage::Guess {
                session: SessionId::from("alice"),
                round: 0,
                guess: "Firelink Shrine".into(),
            })
            .unwrap();
        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match &*handle.status.read() {
            RoomStatus::Reviewing { scores, correct, .. } => {
                assert_eq!(scores.get(&SessionId::from("alice")), Some(&1));
                assert!(correct.contains(&SessionId::from("alice")));
            }
            other => panic!("expected Reviewing, got {:?}", std::mem::discriminant(other)),
        }
    }

    /// Non-host NEXT is silently ignored (open question 2, pinned).
    #[tokio::test]
    async fn non_host_next_is_ignored() {
        let (handle, _join, _library) = test_room(1);
        let (_link_a, _rx_a) = join(&handle, "alice").await;
        let (_link_b, _rx_b) = join(&handle, "bob").await;
        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("bob") }).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(&*handle.status.read(), RoomStatus::Lobby { .. }));
    }

    /// P6 — only the last guess in a round influences scoring.
    #[tokio::test]
    async fn only_last_guess_in_round_counts() {
        let (handle, _join, _library) = test_room(1);
        let (_link, mut rx) = join(&handle, "alice").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Playing");
            if matches!(&*handle.status.read(), RoomStatus::Playing { .. }) {
                break;
            }
            let _ = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        }

        handle
            .mailbox()
            .send(ControllerMessage::Guess {
                session: SessionId::from("alice"),
                round: 0,
                guess: "Firelink Shrine".into(),
            })
            .unwrap();
        handle
            .mailbox()
            .send(ControllerMessage::Guess {
                session: SessionId::from("alice"),
                round: 0,
                guess: "wrong answer".into(),
            })
            .unwrap();
        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match &*handle.status.read() {
            RoomStatus::Reviewing { scores, .. } => {
                assert_eq!(scores.get(&SessionId::from("alice")), None);
            }
            other => panic!("expected Reviewing, got {:?}", std::mem::discriminant(other)),
        }
    }

    /// S4 — mid-game rejoin: a committed player who disconnects during
    /// `Playing` and reconnects gets ROOM_CONFIG/ROOM_STATE plus a re-sent
    /// SONG_DATA + binary pair for the current round (§4.4.3, §8 S4).
    #[tokio::test]
    async fn mid_game_rejoin_resends_current_round_audio() {
        use crate::player_link::test_support::Frame;

        let library = FixedSongLibrary::new(vec![
            ("a0", "Prompt 0", "Answer 0"),
            ("a1", "Prompt 1", "Answer 1"),
        ]);
        let sessions = Arc::new(InMemorySessionDirectory::new());
        let spawner = Arc::new(TokioSpawner::current());
        let config = RoomConfiguration {
            rounds: 2,
            ..test_config()
        };
        let (handle, _join) = spawn(RoomId::from("room-s4"), config, library, sessions, spawner);

        let (_alice_link, _alice_rx) = join(&handle, "alice").await;
        let (bob_link, _bob_rx) = join(&handle, "bob").await;
        handle.mailbox().send(ControllerMessage::Start { session: SessionId::from("alice") }).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !matches!(&*handle.status.read(), RoomStatus::Buffering { round: 0, .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Buffering(0)");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        while !matches!(&*handle.status.read(), RoomStatus::Playing { round: 0, .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Playing(0)");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        while !matches!(&*handle.status.read(), RoomStatus::Reviewing { round: 0, .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Reviewing(0)");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        while !matches!(&*handle.status.read(), RoomStatus::Buffering { round: 1, .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Buffering(1)");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle.mailbox().send(ControllerMessage::NextRound { session: SessionId::from("alice") }).unwrap();
        while !matches!(&*handle.status.read(), RoomStatus::Playing { round: 1, .. }) {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for Playing(1)");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handle
            .mailbox()
            .send(ControllerMessage::ClosedConnection {
                session: SessionId::from("bob"),
                link: bob_link.clone(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (_bob_link2, mut bob_rx2) = join(&handle, "bob").await;

        match bob_rx2.recv().await.expect("expected ROOM_CONFIG frame") {
            Frame::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "ROOM_CONFIG");
            }
            _ => panic!("expected ROOM_CONFIG text frame"),
        }

        match bob_rx2.recv().await.expect("expected ROOM_STATE frame") {
            Frame::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "ROOM_STATE");
                assert_eq!(value["state"]["state"], "PLAYING");
                assert_eq!(value["state"]["round"], 1);
            }
            _ => panic!("expected ROOM_STATE text frame"),
        }

        let announced_size = match bob_rx2.recv().await.expect("expected SONG_DATA frame") {
            Frame::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "SONG_DATA");
                assert_eq!(value["round"], 1);
                value["size_bytes"].as_u64().expect("size_bytes should be a number")
            }
            _ => panic!("expected SONG_DATA text frame"),
        };

        match bob_rx2.recv().await.expect("expected binary payload frame") {
            Frame::Binary(bytes) => {
                assert_eq!(bytes.len() as u64, announced_size);
            }
            _ => panic!("expected the frame immediately after SONG_DATA to be binary"),
        }
    }
}
