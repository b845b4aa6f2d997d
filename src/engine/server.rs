// Match server: runs a match headless or on a dedicated thread, broadcasting
// event records as JSON to subscribers.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::metrics;
use crate::replay::ReplayRecorder;

use super::config::{GameMode, MatchConfig};
use super::controller::PlayerEntry;
use super::error::SetupError;
use super::event::{Event, EventRecord};
use super::game::{Match, MatchObserver, MatchSummary, StopHandle};
use super::invoke::panic_message;
use super::player::PlayerId;

/// Result of a completed match, passed to the on_complete callback.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub summary: MatchSummary,
    /// Gzipped JSON replay, empty if encoding failed.
    pub replay_data: Vec<u8>,
    pub event_count: usize,
}

/// Messages sent from the match thread to subscribers.
#[derive(Clone, Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchMessage {
    Event { record: EventRecord },
    RoundScores {
        round: u32,
        scores: BTreeMap<PlayerId, u32>,
    },
    MatchSummary { summary: MatchSummary },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("a match is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("failed to start match thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Build and run a match on the calling thread.
pub fn run_match_headless(
    config: MatchConfig,
    entries: Vec<PlayerEntry>,
) -> Result<MatchResult, SetupError> {
    let game = Match::new(config, entries)?;
    Ok(play_headless(game))
}

/// Run an admitted match to completion on the calling thread.
///
/// A panic inside the engine is logged and counted, then propagated.
pub fn play_headless(mut game: Match) -> MatchResult {
    let mode = game.config().mode;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let summary = game.run();
        collect_result(&game, summary)
    }));

    match result {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload);
            tracing::error!(match_id = %game.id(), "Match engine panicked: {msg}");
            metrics::MATCHES_ERRORED_TOTAL
                .with_label_values(&[mode.as_str()])
                .inc();
            metrics::ACTIVE_MATCHES.dec();
            panic::resume_unwind(Box::new(msg))
        }
    }
}

fn collect_result(game: &Match, summary: MatchSummary) -> MatchResult {
    let records = game.records();
    let event_count = records.len();
    let mut recorder = ReplayRecorder::new(game.config().clone());
    for record in records {
        recorder.record(record);
    }
    let replay_data = recorder.finish().unwrap_or_else(|e| {
        tracing::error!(match_id = %summary.match_id, "Failed to encode replay: {e}");
        Vec::new()
    });
    MatchResult {
        summary,
        replay_data,
        event_count,
    }
}

/// Metadata about the currently running match.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveMatchInfo {
    pub match_id: Uuid,
    pub player_names: Vec<String>,
    pub mode: GameMode,
    pub start_time: String,
    pub spectator_count: usize,
    pub current_round: u32,
    pub rounds: u32,
}

#[derive(Debug, Clone)]
struct MatchMeta {
    match_id: Uuid,
    player_names: Vec<String>,
    mode: GameMode,
    rounds: u32,
    start_time: String,
}

/// Forwards match activity into the broadcast channel.
struct BroadcastObserver {
    tx: broadcast::Sender<String>,
    current_round: Arc<AtomicU32>,
}

impl BroadcastObserver {
    fn send(&self, msg: &MatchMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            let _ = self.tx.send(json);
        }
    }
}

impl MatchObserver for BroadcastObserver {
    fn event_recorded(&self, record: &EventRecord) {
        if let Event::RoundBegin { round, .. } = record.payload {
            self.current_round.store(round, Ordering::Relaxed);
        }
        self.send(&MatchMessage::Event {
            record: record.clone(),
        });
    }

    fn round_ended(&self, round: u32, scores: &BTreeMap<PlayerId, u32>) {
        self.send(&MatchMessage::RoundScores {
            round,
            scores: scores.clone(),
        });
    }

    fn match_ended(&self, summary: &MatchSummary) {
        self.send(&MatchMessage::MatchSummary {
            summary: summary.clone(),
        });
    }
}

/// Runs one live match at a time on a dedicated OS thread and broadcasts its
/// events to subscribers.
pub struct MatchServer {
    broadcast_tx: broadcast::Sender<String>,
    running: Arc<AtomicBool>,
    stop: Arc<Mutex<Option<StopHandle>>>,
    match_meta: Arc<Mutex<Option<MatchMeta>>>,
    current_round: Arc<AtomicU32>,
}

impl Default for MatchServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            broadcast_tx: tx,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Mutex::new(None)),
            match_meta: Arc::new(Mutex::new(None)),
            current_round: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Subscribe to match messages. Returns a receiver that yields JSON strings.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the running match, if any, to stop before its next controller call.
    pub fn stop_match(&self) {
        if let Some(stop) = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            stop.stop();
        }
    }

    pub fn spectator_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    pub fn active_match_info(&self) -> Option<ActiveMatchInfo> {
        if !self.is_running() {
            return None;
        }
        let meta = self
            .match_meta
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(ActiveMatchInfo {
            match_id: meta.match_id,
            player_names: meta.player_names,
            mode: meta.mode,
            start_time: meta.start_time,
            spectator_count: self.spectator_count(),
            current_round: self.current_round.load(Ordering::Relaxed),
            rounds: meta.rounds,
        })
    }

    /// Admit the players and start the match.
    pub fn start_match(
        &self,
        config: MatchConfig,
        entries: Vec<PlayerEntry>,
        on_complete: Option<Box<dyn FnOnce(MatchResult) + Send + 'static>>,
    ) -> Result<Uuid, ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        let game = Match::new(config, entries)?;
        self.launch(game, on_complete)
    }

    /// Start an already admitted match on a dedicated thread.
    pub fn launch(
        &self,
        mut game: Match,
        on_complete: Option<Box<dyn FnOnce(MatchResult) + Send + 'static>>,
    ) -> Result<Uuid, ServerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServerError::AlreadyRunning);
        }

        let match_id = game.id();
        *self.match_meta.lock().unwrap_or_else(PoisonError::into_inner) = Some(MatchMeta {
            match_id,
            player_names: game.player_names(),
            mode: game.config().mode,
            rounds: game.config().rounds,
            start_time: chrono::Utc::now().to_rfc3339(),
        });
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = Some(game.stop_handle());
        self.current_round.store(0, Ordering::Relaxed);

        game.add_observer(Box::new(BroadcastObserver {
            tx: self.broadcast_tx.clone(),
            current_round: Arc::clone(&self.current_round),
        }));

        let running = Arc::clone(&self.running);
        let stop = Arc::clone(&self.stop);
        let match_meta = Arc::clone(&self.match_meta);
        let current_round = Arc::clone(&self.current_round);

        let spawned = std::thread::Builder::new()
            .name(format!("match-{match_id}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| play_headless(game)));
                match result {
                    Ok(result) => {
                        if let Some(callback) = on_complete {
                            callback(result);
                        }
                    }
                    Err(_) => {
                        tracing::error!(%match_id, "Match thread died, aborting");
                        std::process::abort();
                    }
                }

                *match_meta.lock().unwrap_or_else(PoisonError::into_inner) = None;
                *stop.lock().unwrap_or_else(PoisonError::into_inner) = None;
                current_round.store(0, Ordering::Relaxed);
                running.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::Release);
            *self.match_meta.lock().unwrap_or_else(PoisonError::into_inner) = None;
            *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = None;
            return Err(ServerError::Spawn(e));
        }
        Ok(match_id)
    }
}
