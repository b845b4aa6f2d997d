use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::config::{GameMode, MatchConfig};
use super::controller::{ControllerInfo, PlayerEntry};
use super::error::{ControllerFault, SetupError};
use super::event::{Event, EventRecord, LossReason};
use super::log::{EventLog, EventLogReader};
use super::player::PlayerId;
use super::proxy::{CallStats, ControllerProxy};
use super::round::{Round, RoundContext};
use super::state::MatchState;
use crate::metrics;

/// Cooperative stop flag. The match checks it before every controller call.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Synchronous hooks called on the match thread. Implementations must return
/// quickly; anything slow belongs behind a channel.
pub trait MatchObserver: Send {
    /// A record was appended and applied.
    fn event_recorded(&self, _record: &EventRecord) {}

    /// `player` is about to take a turn.
    fn turn_advanced(&self, _round: u32, _player: PlayerId) {}

    /// Rounds won per player after `round` ended.
    fn round_ended(&self, _round: u32, _scores: &BTreeMap<PlayerId, u32>) {}

    fn match_ended(&self, _summary: &MatchSummary) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub team: Option<String>,
    pub controller: Option<ControllerInfo>,
    pub rounds_won: u32,
    /// Sat out the whole match after failing `new_match`.
    pub retired: bool,
    pub calls: CallStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    /// RFC 3339 start time.
    pub started_at: String,
    pub duration_ms: u64,
    pub mode: GameMode,
    pub rounds_played: u32,
    pub stopped: bool,
    /// Top scorers. Empty when the match was stopped or nobody won a round.
    pub winners: Vec<PlayerId>,
    pub players: Vec<PlayerSummary>,
}

impl MatchSummary {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn scores(&self) -> BTreeMap<PlayerId, u32> {
        self.players.iter().map(|p| (p.id, p.rounds_won)).collect()
    }
}

struct RosterEntry {
    id: PlayerId,
    name: String,
    team: Option<String>,
}

/// A configured match: players admitted, controllers identified, nothing
/// played yet.
pub struct Match {
    id: Uuid,
    config: MatchConfig,
    roster: Vec<RosterEntry>,
    log: EventLog,
    proxies: BTreeMap<PlayerId, ControllerProxy>,
    rng: StdRng,
    stop: StopHandle,
    observers: Vec<Box<dyn MatchObserver>>,
}

impl Match {
    /// Admit `entries` as players 1..=n in order.
    ///
    /// Every controller is started and asked to identify itself under the
    /// match time limit; one that fails or does not support the configured
    /// mode rejects the whole match.
    pub fn new(config: MatchConfig, entries: Vec<PlayerEntry>) -> Result<Self, SetupError> {
        config.validate()?;
        if entries.len() < 2 {
            return Err(SetupError::NotEnoughPlayers {
                found: entries.len(),
                required: 2,
            });
        }
        match config.mode {
            GameMode::Duel if entries.len() != 2 => {
                return Err(SetupError::InvalidConfig(format!(
                    "duel takes exactly 2 players, got {}",
                    entries.len()
                )));
            }
            GameMode::Teams => {
                if let Some(entry) = entries.iter().find(|e| e.team.is_none()) {
                    return Err(SetupError::InvalidConfig(format!(
                        "player '{}' has no team",
                        entry.name
                    )));
                }
                let teams: BTreeSet<_> = entries.iter().filter_map(|e| e.team.as_ref()).collect();
                if teams.len() < 2 {
                    return Err(SetupError::InvalidConfig(
                        "team play needs at least two teams".to_string(),
                    ));
                }
            }
            _ => {}
        }

        let shared = Arc::new(config.clone());
        let mut proxies = BTreeMap::new();
        let mut roster = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let id = i as PlayerId + 1;
            let mut proxy =
                ControllerProxy::spawn(id, &entry.name, entry.controller, Arc::clone(&shared))?;
            let info = proxy
                .identify()
                .map_err(|fault| SetupError::IdentificationFailed {
                    name: entry.name.clone(),
                    reason: fault.to_string(),
                })?;
            if !info.supports(config.mode) {
                return Err(SetupError::ControllerIncompatible {
                    name: info.name,
                    mode: config.mode,
                });
            }
            roster.push(RosterEntry {
                id,
                name: entry.name,
                team: entry.team,
            });
            proxies.insert(id, proxy);
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Match {
            id: Uuid::new_v4(),
            log: EventLog::new(config.clone()),
            config,
            roster,
            proxies,
            rng,
            stop: StopHandle::default(),
            observers: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn player_names(&self) -> Vec<String> {
        self.roster.iter().map(|r| r.name.clone()).collect()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn add_observer(&mut self, observer: Box<dyn MatchObserver>) {
        self.observers.push(observer);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.log.subscribe()
    }

    pub fn reader(&self) -> EventLogReader {
        self.log.reader()
    }

    pub fn state(&self) -> &MatchState {
        self.log.state()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.log.records()
    }

    /// Play every configured round.
    ///
    /// # Panics
    ///
    /// A match can only be run once; running it again corrupts the event log.
    pub fn run(&mut self) -> MatchSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mode = self.config.mode;
        metrics::MATCHES_STARTED_TOTAL
            .with_label_values(&[mode.as_str()])
            .inc();
        metrics::ACTIVE_MATCHES.inc();
        tracing::info!(
            match_id = %self.id,
            mode = mode.as_str(),
            players = self.roster.len(),
            rounds = self.config.rounds,
            "Match started"
        );

        let ids: Vec<PlayerId> = self.roster.iter().map(|r| r.id).collect();
        let mut ctx = RoundContext {
            log: &mut self.log,
            proxies: &mut self.proxies,
            rng: &mut self.rng,
            stop: &self.stop,
            observers: &self.observers,
        };

        for entry in &self.roster {
            ctx.emit(Event::PlayerJoined {
                player: entry.id,
                name: entry.name.clone(),
                team: entry.team.clone(),
            });
        }
        ctx.emit(Event::MatchBegin {
            mode,
            rounds: self.config.rounds,
        });

        let mut retired = BTreeSet::new();
        for &id in &ids {
            if ctx.stop.is_stopped() {
                break;
            }
            if let Err(fault) = ctx.call(id, |p| p.new_match()) {
                retire(&mut ctx, &fault);
                retired.insert(id);
            }
        }

        let mut rounds_played = 0;
        let mut stopped = false;
        for number in 1..=self.config.rounds {
            if ctx.stop.is_stopped() {
                stopped = true;
                break;
            }
            let participants = ids
                .iter()
                .copied()
                .filter(|id| !retired.contains(id))
                .collect();
            let outcome = Round::new(number, participants).run(&mut ctx);
            if outcome.stopped {
                stopped = true;
                break;
            }
            rounds_played += 1;
        }

        if !stopped {
            for &id in &ids {
                if let Err(fault) = ctx.call(id, |p| p.match_over()) {
                    match fault {
                        ControllerFault::Busy { .. } => {
                            tracing::debug!(player_id = id, "Skipped match_over: {fault}")
                        }
                        _ => tracing::warn!(player_id = id, "{fault}"),
                    }
                }
            }
        }

        let scores = ctx.log.state().scores();
        let best = scores.values().copied().max().unwrap_or(0);
        let winners: Vec<PlayerId> = if stopped || best == 0 {
            Vec::new()
        } else {
            scores
                .iter()
                .filter(|(_, &score)| score == best)
                .map(|(&id, _)| id)
                .collect()
        };
        for &player in &winners {
            ctx.emit(Event::PlayerWon {
                player,
                rounds_won: best,
            });
        }
        ctx.emit(Event::MatchEnd { stopped });

        let players = self
            .roster
            .iter()
            .map(|r| {
                let proxy = self.proxies.get(&r.id);
                PlayerSummary {
                    id: r.id,
                    name: r.name.clone(),
                    team: r.team.clone(),
                    controller: proxy.and_then(|p| p.info().cloned()),
                    rounds_won: scores.get(&r.id).copied().unwrap_or(0),
                    retired: retired.contains(&r.id),
                    calls: proxy.map(|p| p.stats().clone()).unwrap_or_default(),
                }
            })
            .collect();

        let duration = clock.elapsed();
        let summary = MatchSummary {
            match_id: self.id,
            started_at: started_at.to_rfc3339(),
            duration_ms: duration.as_millis() as u64,
            mode,
            rounds_played,
            stopped,
            winners,
            players,
        };

        for observer in &self.observers {
            observer.match_ended(&summary);
        }

        metrics::ACTIVE_MATCHES.dec();
        metrics::MATCHES_COMPLETED_TOTAL
            .with_label_values(&[mode.as_str()])
            .inc();
        metrics::MATCH_DURATION_SECONDS
            .with_label_values(&[mode.as_str()])
            .observe(duration.as_secs_f64());
        tracing::info!(
            match_id = %self.id,
            rounds_played,
            stopped,
            winners = ?summary.winners,
            duration_ms = summary.duration_ms,
            "Match ended"
        );
        summary
    }
}

/// A player that failed `new_match` sits out every round.
fn retire(ctx: &mut RoundContext<'_>, fault: &ControllerFault) {
    let player = fault.player();
    if let ControllerFault::TimedOut {
        method,
        elapsed,
        budget,
        ..
    } = fault
    {
        ctx.emit(Event::PlayerTimeout {
            player,
            method: method.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            budget_ms: budget.as_millis() as u64,
        });
    }
    let reason = LossReason::from(fault);
    metrics::DISQUALIFICATIONS_TOTAL
        .with_label_values(&[reason.label()])
        .inc();
    tracing::warn!(
        player_id = player,
        round = 1,
        reason = reason.label(),
        "Player retired from match: {fault}"
    );
    ctx.emit(Event::PlayerLost {
        player,
        round: 1,
        reason,
    });
}
