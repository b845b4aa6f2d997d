// Controller proxy: the round engine's only way to reach a controller.
// Every lifecycle call is timed against the match budget and turned into a
// `Result` the engine can act on.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::config::MatchConfig;
use super::controller::{Controller, ControllerInfo};
use super::error::{ControllerFault, SetupError};
use super::field::{Shot, Target};
use super::geometry::Ship;
use super::invoke::{Outcome, TimedInvoker};
use super::player::PlayerId;
use crate::metrics;

type DynController = dyn Controller;

/// Per-controller call accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallStats {
    pub calls: u64,
    pub timeouts: u64,
    pub faults: u64,
    /// Calls refused because an abandoned call was still running.
    pub refused: u64,
    pub total_elapsed_ms: f64,
    pub max_elapsed_ms: f64,
}

impl CallStats {
    fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.calls += 1;
        self.total_elapsed_ms += ms;
        if ms > self.max_elapsed_ms {
            self.max_elapsed_ms = ms;
        }
    }
}

pub struct ControllerProxy {
    player: PlayerId,
    name: String,
    config: Arc<MatchConfig>,
    invoker: TimedInvoker<DynController>,
    info: Option<ControllerInfo>,
    stats: CallStats,
}

impl ControllerProxy {
    /// Move `controller` onto its own worker thread.
    pub fn spawn(
        player: PlayerId,
        name: &str,
        controller: Box<dyn Controller>,
        config: Arc<MatchConfig>,
    ) -> Result<Self, SetupError> {
        let invoker = TimedInvoker::spawn(&format!("{player}-{name}"), controller).map_err(|e| {
            SetupError::IdentificationFailed {
                name: name.to_string(),
                reason: format!("failed to start worker thread: {e}"),
            }
        })?;
        Ok(ControllerProxy {
            player,
            name: name.to_string(),
            config,
            invoker,
            info: None,
            stats: CallStats::default(),
        })
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identification returned by the last successful `identify` call.
    pub fn info(&self) -> Option<&ControllerInfo> {
        self.info.as_ref()
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn is_busy(&self) -> bool {
        self.invoker.is_busy()
    }

    pub fn identify(&mut self) -> Result<ControllerInfo, ControllerFault> {
        let info = self.call("info", |c| c.info())?;
        self.info = Some(info.clone());
        Ok(info)
    }

    pub fn new_match(&mut self) -> Result<(), ControllerFault> {
        let config = Arc::clone(&self.config);
        let player = self.player;
        self.call("new_match", move |c| c.new_match(&config, player))
    }

    pub fn new_round(&mut self) -> Result<(), ControllerFault> {
        self.call("new_round", |c| c.new_round())
    }

    pub fn place_ships(&mut self) -> Result<Vec<Ship>, ControllerFault> {
        self.call("place_ships", |c| c.place_ships())
    }

    pub fn make_shot(&mut self, opponents: Vec<PlayerId>) -> Result<Target, ControllerFault> {
        self.call("make_shot", move |c| c.make_shot(&opponents))
    }

    pub fn opponent_shot(&mut self, shot: Shot) -> Result<(), ControllerFault> {
        self.call("opponent_shot", move |c| c.opponent_shot(shot))
    }

    pub fn shot_hit(&mut self, shot: Shot, sunk: bool) -> Result<(), ControllerFault> {
        self.call("shot_hit", move |c| c.shot_hit(shot, sunk))
    }

    pub fn shot_miss(&mut self, shot: Shot) -> Result<(), ControllerFault> {
        self.call("shot_miss", move |c| c.shot_miss(shot))
    }

    pub fn round_won(&mut self) -> Result<(), ControllerFault> {
        self.call("round_won", |c| c.round_won())
    }

    pub fn round_lost(&mut self) -> Result<(), ControllerFault> {
        self.call("round_lost", |c| c.round_lost())
    }

    pub fn match_over(&mut self) -> Result<(), ControllerFault> {
        self.call("match_over", |c| c.match_over())
    }

    fn call<R, F>(&mut self, method: &'static str, f: F) -> Result<R, ControllerFault>
    where
        R: Send + 'static,
        F: FnOnce(&mut DynController) -> R + Send + 'static,
    {
        let budget = self.config.time_limit;
        let invocation = self.invoker.invoke(budget, f);
        let elapsed = invocation.elapsed;

        if !matches!(invocation.outcome, Outcome::Busy) {
            self.stats.record(elapsed);
            metrics::CONTROLLER_CALL_DURATION_MS
                .with_label_values(&[method])
                .observe(elapsed.as_secs_f64() * 1000.0);
        }

        match invocation.outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::TimedOut => {
                self.stats.timeouts += 1;
                metrics::CONTROLLER_TIMEOUTS_TOTAL
                    .with_label_values(&[method])
                    .inc();
                tracing::warn!(
                    player_id = self.player,
                    method,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "Controller call timed out"
                );
                Err(ControllerFault::TimedOut {
                    player: self.player,
                    method,
                    elapsed,
                    budget,
                })
            }
            Outcome::Faulted(message) => {
                self.stats.faults += 1;
                metrics::CONTROLLER_FAULTS_TOTAL
                    .with_label_values(&[method])
                    .inc();
                Err(ControllerFault::Faulted {
                    player: self.player,
                    method,
                    message,
                })
            }
            Outcome::Busy => {
                self.stats.refused += 1;
                metrics::CONTROLLER_FAULTS_TOTAL
                    .with_label_values(&[method])
                    .inc();
                Err(ControllerFault::Busy {
                    player: self.player,
                    method,
                })
            }
        }
    }
}
