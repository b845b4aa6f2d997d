// Round state machine: ship placement, then turn rotation until at most one
// side is left standing, then round-end notifications.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::error::ControllerFault;
use super::event::{Event, EventRecord, LossReason, PlacementVerdict};
use super::field::{validate_placement, Shot, ShotOutcome};
use super::game::{MatchObserver, StopHandle};
use super::log::EventLog;
use super::player::PlayerId;
use super::proxy::ControllerProxy;
use crate::metrics;

/// Everything a round borrows from the match that owns it.
pub struct RoundContext<'a> {
    pub log: &'a mut EventLog,
    pub proxies: &'a mut BTreeMap<PlayerId, ControllerProxy>,
    pub rng: &'a mut StdRng,
    pub stop: &'a StopHandle,
    pub observers: &'a [Box<dyn MatchObserver>],
}

impl RoundContext<'_> {
    /// Append an event and hand the record to observers.
    pub fn emit(&mut self, event: Event) -> EventRecord {
        let record = self.log.append(event);
        for observer in self.observers {
            observer.event_recorded(&record);
        }
        record
    }

    pub(super) fn call<R>(
        &mut self,
        player: PlayerId,
        f: impl FnOnce(&mut ControllerProxy) -> Result<R, ControllerFault>,
    ) -> Result<R, ControllerFault> {
        match self.proxies.get_mut(&player) {
            Some(proxy) => f(proxy),
            None => Err(ControllerFault::Faulted {
                player,
                method: "lookup",
                message: "no controller registered for player".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Starting,
    ShipPlacement,
    TurnRotation,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u32,
    pub winners: Vec<PlayerId>,
    pub stopped: bool,
    /// Turns taken during turn rotation.
    pub turns: u32,
}

pub struct Round {
    number: u32,
    participants: Vec<PlayerId>,
    phase: RoundPhase,
    order: Vec<PlayerId>,
    /// Index into `order` of the player whose turn it is.
    current: usize,
    turns: u32,
    outcome: Option<RoundOutcome>,
}

impl Round {
    pub fn new(number: u32, mut participants: Vec<PlayerId>) -> Self {
        participants.sort_unstable();
        participants.dedup();
        Round {
            number,
            participants,
            phase: RoundPhase::Starting,
            order: Vec::new(),
            current: 0,
            turns: 0,
            outcome: None,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Player whose turn it is, once turn rotation has started.
    pub fn current_player(&self) -> Option<PlayerId> {
        match self.phase {
            RoundPhase::TurnRotation => self.order.get(self.current).copied(),
            _ => None,
        }
    }

    /// Drive the round to its end.
    pub fn run(mut self, ctx: &mut RoundContext<'_>) -> RoundOutcome {
        while self.phase != RoundPhase::Ended {
            self.step(ctx);
        }
        self.outcome.unwrap_or(RoundOutcome {
            round: self.number,
            winners: Vec::new(),
            stopped: true,
            turns: self.turns,
        })
    }

    /// Advance by one phase, or by one turn during turn rotation.
    pub fn step(&mut self, ctx: &mut RoundContext<'_>) {
        match self.phase {
            RoundPhase::Starting => self.begin(ctx),
            RoundPhase::ShipPlacement => self.place_ships(ctx),
            RoundPhase::TurnRotation => self.take_turn(ctx),
            RoundPhase::Ended => {}
        }
    }

    fn begin(&mut self, ctx: &mut RoundContext<'_>) {
        ctx.emit(Event::RoundBegin {
            round: self.number,
            participants: self.participants.clone(),
        });
        tracing::info!(round = self.number, participants = ?self.participants, "Round started");

        for player in self.participants.clone() {
            if self.halted(ctx) {
                return;
            }
            if let Err(fault) = ctx.call(player, |p| p.new_round()) {
                self.disqualify(ctx, fault);
            }
        }
        self.phase = RoundPhase::ShipPlacement;
    }

    fn place_ships(&mut self, ctx: &mut RoundContext<'_>) {
        for player in self.participants.clone() {
            if !ctx.log.state().is_active(player) {
                continue;
            }
            if self.halted(ctx) {
                return;
            }
            match ctx.call(player, |p| p.place_ships()) {
                Ok(ships) => {
                    let verdict = match validate_placement(&ctx.log.state().config, &ships) {
                        Ok(()) => PlacementVerdict::Valid,
                        Err(error) => PlacementVerdict::Invalid { error },
                    };
                    let rejected = match &verdict {
                        PlacementVerdict::Invalid { error } => Some(error.clone()),
                        PlacementVerdict::Valid => None,
                    };
                    ctx.emit(Event::PlayerShipsPlaced {
                        player,
                        ships,
                        verdict,
                    });
                    if let Some(error) = rejected {
                        self.eliminate(ctx, player, LossReason::InvalidPlacement { error });
                    }
                }
                Err(fault) => self.disqualify(ctx, fault),
            }
        }

        if ctx.log.state().round_decided() {
            self.finish(ctx);
            return;
        }

        let mut order = ctx.log.state().active_players();
        order.shuffle(&mut *ctx.rng);
        ctx.emit(Event::TurnOrderDecided {
            order: order.clone(),
        });
        self.order = order;
        self.current = 0;
        self.phase = RoundPhase::TurnRotation;
    }

    fn take_turn(&mut self, ctx: &mut RoundContext<'_>) {
        if self.halted(ctx) {
            return;
        }
        let Some(&shooter) = self.order.get(self.current) else {
            self.finish(ctx);
            return;
        };
        self.turns += 1;
        for observer in ctx.observers {
            observer.turn_advanced(self.number, shooter);
        }

        let opponents: Vec<PlayerId> = {
            let state = ctx.log.state();
            state
                .active_players()
                .into_iter()
                .filter(|&p| state.are_opponents(shooter, p))
                .collect()
        };

        match ctx.call(shooter, move |p| p.make_shot(opponents)) {
            Err(fault) => self.disqualify(ctx, fault),
            Ok(target) => match ctx.log.state().validate_shot(shooter, target) {
                Err(error) => self.eliminate(ctx, shooter, LossReason::InvalidShot { error }),
                Ok(shot) => self.resolve_shot(ctx, shot),
            },
        }

        if ctx.log.state().round_decided() {
            self.finish(ctx);
            return;
        }
        self.advance(ctx, shooter);
    }

    fn resolve_shot(&mut self, ctx: &mut RoundContext<'_>, shot: Shot) {
        ctx.emit(Event::PlayerShot { shot });

        if !ctx.stop.is_stopped() {
            if let Err(fault) = ctx.call(shot.receiver, |p| p.opponent_shot(shot)) {
                self.disqualify(ctx, fault);
            }
        }
        // A receiver disqualified while being notified is out; the shot is
        // not resolved against its field.
        if !ctx.log.state().is_active(shot.receiver) {
            return;
        }

        let outcome = ctx
            .log
            .state()
            .players
            .get(&shot.receiver)
            .map(|p| p.field.resolve(shot.coords))
            .unwrap_or(ShotOutcome::Miss);

        match outcome {
            ShotOutcome::Miss => {
                if !ctx.stop.is_stopped() {
                    if let Err(fault) = ctx.call(shot.shooter, |p| p.shot_miss(shot)) {
                        self.disqualify(ctx, fault);
                    }
                }
            }
            ShotOutcome::Hit { ship_index, sunk } => {
                ctx.emit(Event::PlayerHitShip { shot, ship_index });
                if !ctx.stop.is_stopped() {
                    if let Err(fault) = ctx.call(shot.shooter, |p| p.shot_hit(shot, sunk)) {
                        self.disqualify(ctx, fault);
                    }
                }
                if sunk {
                    let ship = ctx
                        .log
                        .state()
                        .players
                        .get(&shot.receiver)
                        .and_then(|p| p.field.ships.get(ship_index))
                        .map(|placed| placed.ship);
                    if let Some(ship) = ship {
                        ctx.emit(Event::PlayerShipDestroyed {
                            shot,
                            ship_index,
                            ship,
                        });
                    }
                    let fleet_gone = ctx
                        .log
                        .state()
                        .players
                        .get(&shot.receiver)
                        .map(|p| p.field.fleet_destroyed())
                        .unwrap_or(false);
                    if fleet_gone {
                        self.eliminate(
                            ctx,
                            shot.receiver,
                            LossReason::FleetDestroyed { by: shot.shooter },
                        );
                    }
                }
            }
        }
    }

    /// Move to the next active player after `shooter`, wrapping around the
    /// fixed order.
    fn advance(&mut self, ctx: &mut RoundContext<'_>, shooter: PlayerId) {
        let next = {
            let state = ctx.log.state();
            let n = self.order.len();
            (1..=n)
                .map(|k| (self.current + k) % n)
                .find(|&i| self.order[i] != shooter && state.is_active(self.order[i]))
        };
        match next {
            Some(index) => self.current = index,
            None => self.finish(ctx),
        }
    }

    fn finish(&mut self, ctx: &mut RoundContext<'_>) {
        let winners = ctx.log.state().active_players();

        for &player in &winners {
            if self.halted(ctx) {
                return;
            }
            if let Err(fault) = ctx.call(player, |p| p.round_won()) {
                self.notification_failed(ctx, fault);
            }
        }
        for player in self.participants.clone() {
            if winners.contains(&player) {
                continue;
            }
            if self.halted(ctx) {
                return;
            }
            if let Err(fault) = ctx.call(player, |p| p.round_lost()) {
                self.notification_failed(ctx, fault);
            }
        }

        ctx.emit(Event::RoundEnd {
            round: self.number,
            winners: winners.clone(),
            stopped: false,
        });
        metrics::ROUNDS_COMPLETED_TOTAL.inc();
        tracing::info!(round = self.number, ?winners, turns = self.turns, "Round ended");
        self.close(
            ctx,
            RoundOutcome {
                round: self.number,
                winners,
                stopped: false,
                turns: self.turns,
            },
        );
    }

    /// End the round early if a stop was requested. Returns true when the
    /// round is over and the caller must not touch any controller.
    fn halted(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if self.phase == RoundPhase::Ended {
            return true;
        }
        if !ctx.stop.is_stopped() {
            return false;
        }
        ctx.emit(Event::RoundEnd {
            round: self.number,
            winners: Vec::new(),
            stopped: true,
        });
        tracing::info!(round = self.number, "Round stopped");
        self.close(
            ctx,
            RoundOutcome {
                round: self.number,
                winners: Vec::new(),
                stopped: true,
                turns: self.turns,
            },
        );
        true
    }

    fn close(&mut self, ctx: &mut RoundContext<'_>, outcome: RoundOutcome) {
        self.phase = RoundPhase::Ended;
        let scores = ctx.log.state().scores();
        for observer in ctx.observers {
            observer.round_ended(self.number, &scores);
        }
        self.outcome = Some(outcome);
    }

    fn disqualify(&mut self, ctx: &mut RoundContext<'_>, fault: ControllerFault) {
        let player = fault.player();
        if !ctx.log.state().is_active(player) {
            return;
        }
        if let ControllerFault::TimedOut {
            method,
            elapsed,
            budget,
            ..
        } = &fault
        {
            ctx.emit(Event::PlayerTimeout {
                player,
                method: method.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            });
        }
        self.eliminate(ctx, player, LossReason::from(&fault));
    }

    fn eliminate(&mut self, ctx: &mut RoundContext<'_>, player: PlayerId, reason: LossReason) {
        if !ctx.log.state().is_active(player) {
            return;
        }
        if reason.is_disqualification() {
            metrics::DISQUALIFICATIONS_TOTAL
                .with_label_values(&[reason.label()])
                .inc();
            tracing::warn!(
                player_id = player,
                round = self.number,
                reason = reason.label(),
                "Player disqualified: {reason:?}"
            );
        } else {
            tracing::info!(player_id = player, round = self.number, "Player eliminated");
        }
        ctx.emit(Event::PlayerLost {
            player,
            round: self.number,
            reason,
        });
    }

    /// A round-end notification failed. The round is already decided, so the
    /// fault is recorded but does not change the outcome.
    fn notification_failed(&mut self, ctx: &mut RoundContext<'_>, fault: ControllerFault) {
        match &fault {
            ControllerFault::TimedOut {
                player,
                method,
                elapsed,
                budget,
            } => {
                ctx.emit(Event::PlayerTimeout {
                    player: *player,
                    method: method.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    budget_ms: budget.as_millis() as u64,
                });
            }
            ControllerFault::Faulted { .. } => {
                tracing::warn!(player_id = fault.player(), round = self.number, "{fault}");
            }
            ControllerFault::Busy { .. } => {
                tracing::debug!(player_id = fault.player(), round = self.number, "{fault}");
            }
        }
    }
}
