// Match state and the event applier. `MatchState::apply` is the only code
// path that mutates players, teams or fields.

use std::collections::BTreeMap;

use serde::Serialize;

use super::config::{GameMode, MatchConfig, DEAD_TEAM_NAME, FREE_FOR_ALL_TEAM_NAME};
use super::error::{ReplayError, ShotError};
use super::event::{Event, EventRecord, PlacementVerdict};
use super::field::{validate_placement, Shot, Target};
use super::player::{Player, PlayerId, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    ShipPlacement,
    TurnRotation,
    RoundEnded,
    MatchEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchState {
    pub config: MatchConfig,
    pub players: BTreeMap<PlayerId, Player>,
    pub teams: BTreeMap<String, Team>,
    pub round: u32,
    pub phase: Phase,
    pub turn_order: Vec<PlayerId>,
    pub last_winners: Vec<PlayerId>,
    /// Sequence number the next applied record must carry.
    pub next_sequence: u64,
}

impl MatchState {
    pub fn new(config: MatchConfig) -> Self {
        let mut teams = BTreeMap::new();
        teams.insert(DEAD_TEAM_NAME.to_string(), Team::dead());
        MatchState {
            config,
            players: BTreeMap::new(),
            teams,
            round: 0,
            phase: Phase::Setup,
            turn_order: Vec::new(),
            last_winners: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Rebuild state by folding the applier over `records` from scratch.
    pub fn replay<'a, I>(config: MatchConfig, records: I) -> Result<Self, ReplayError>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut state = MatchState::new(config);
        for record in records {
            state.apply(record)?;
        }
        Ok(state)
    }

    /// Apply one record. Records must arrive in contiguous sequence order.
    pub fn apply(&mut self, record: &EventRecord) -> Result<(), ReplayError> {
        if record.sequence != self.next_sequence {
            return Err(ReplayError::OutOfOrder {
                expected: self.next_sequence,
                found: record.sequence,
            });
        }
        self.apply_event(&record.payload)
            .map_err(|reason| ReplayError::Inconsistent {
                sequence: record.sequence,
                reason,
            })?;
        self.next_sequence += 1;
        Ok(())
    }

    fn apply_event(&mut self, event: &Event) -> Result<(), String> {
        match event {
            Event::PlayerJoined { player, name, team } => {
                if self.players.contains_key(player) {
                    return Err(format!("player {player} joined twice"));
                }
                self.players
                    .insert(*player, Player::new(*player, name, team.clone()));
                self.team_mut(DEAD_TEAM_NAME).add(*player);
            }
            Event::MatchBegin { mode, .. } => {
                if *mode != self.config.mode {
                    return Err(format!(
                        "match began in mode {mode} but is configured for {}",
                        self.config.mode
                    ));
                }
                self.phase = Phase::Setup;
            }
            Event::RoundBegin {
                round,
                participants,
            } => {
                self.round = *round;
                self.turn_order.clear();
                self.teams.clear();
                self.teams
                    .insert(DEAD_TEAM_NAME.to_string(), Team::dead());
                for player in self.players.values_mut() {
                    player.field.clear();
                    player.team = DEAD_TEAM_NAME.to_string();
                }
                for &id in participants {
                    let team_name = {
                        let player = self
                            .players
                            .get(&id)
                            .ok_or_else(|| format!("unknown participant {id}"))?;
                        match (self.config.mode, &player.home_team) {
                            (GameMode::Teams, Some(team)) => team.clone(),
                            _ => FREE_FOR_ALL_TEAM_NAME.to_string(),
                        }
                    };
                    let friendly = self.config.mode == GameMode::Teams;
                    self.teams
                        .entry(team_name.clone())
                        .or_insert_with(|| Team::new(&team_name, friendly))
                        .add(id);
                    if let Some(player) = self.players.get_mut(&id) {
                        player.team = team_name;
                    }
                }
                for id in self.players.keys().copied().collect::<Vec<_>>() {
                    if !participants.contains(&id) {
                        self.team_mut(DEAD_TEAM_NAME).add(id);
                    }
                }
                self.phase = Phase::ShipPlacement;
            }
            Event::PlayerShipsPlaced {
                player,
                ships,
                verdict,
            } => match verdict {
                PlacementVerdict::Valid => {
                    validate_placement(&self.config, ships)
                        .map_err(|e| format!("layout of player {player} recorded as valid: {e}"))?;
                    self.player_mut(*player)?.field.place(ships);
                }
                // A rejected layout never reaches the field.
                PlacementVerdict::Invalid { .. } => {
                    self.player(*player)?;
                }
            },
            Event::TurnOrderDecided { order } => {
                for id in order {
                    if !self.players.contains_key(id) {
                        return Err(format!("turn order names unknown player {id}"));
                    }
                }
                self.turn_order = order.clone();
                self.phase = Phase::TurnRotation;
            }
            Event::PlayerShot { shot } => {
                if !self.players.contains_key(&shot.receiver) {
                    return Err(format!("shot at unknown player {}", shot.receiver));
                }
                self.player_mut(shot.shooter)?.field.shots_fired.push(*shot);
                self.player_mut(shot.receiver)?
                    .field
                    .shots_received
                    .push(*shot);
            }
            Event::PlayerHitShip { shot, ship_index } => {
                let receiver = self.player_mut(shot.receiver)?;
                if !receiver.field.mark_hit(*ship_index, shot.coords) {
                    return Err(format!(
                        "ship {ship_index} of player {} does not cover {}",
                        shot.receiver, shot.coords
                    ));
                }
            }
            Event::PlayerShipDestroyed {
                shot, ship_index, ..
            } => {
                let receiver = self.player(shot.receiver)?;
                let sunk = receiver
                    .field
                    .ships
                    .get(*ship_index)
                    .map(|s| s.is_sunk())
                    .unwrap_or(false);
                if !sunk {
                    return Err(format!(
                        "ship {ship_index} of player {} is still afloat",
                        shot.receiver
                    ));
                }
            }
            Event::PlayerTimeout { player, .. } | Event::PlayerWon { player, .. } => {
                self.player(*player)?;
            }
            Event::PlayerLost { player, .. } => {
                let current = self.player(*player)?.team.clone();
                if let Some(team) = self.teams.get_mut(&current) {
                    team.remove(*player);
                }
                self.team_mut(DEAD_TEAM_NAME).add(*player);
                self.player_mut(*player)?.team = DEAD_TEAM_NAME.to_string();
            }
            Event::RoundEnd {
                winners, stopped, ..
            } => {
                if !stopped {
                    for id in winners {
                        self.player_mut(*id)?.rounds_won += 1;
                    }
                }
                self.last_winners = winners.clone();
                self.phase = Phase::RoundEnded;
            }
            Event::MatchEnd { .. } => {
                self.phase = Phase::MatchEnded;
            }
        }
        Ok(())
    }

    fn player(&self, id: PlayerId) -> Result<&Player, String> {
        self.players
            .get(&id)
            .ok_or_else(|| format!("unknown player {id}"))
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, String> {
        self.players
            .get_mut(&id)
            .ok_or_else(|| format!("unknown player {id}"))
    }

    fn team_mut(&mut self, name: &str) -> &mut Team {
        let friendly = self.config.mode == GameMode::Teams || name == DEAD_TEAM_NAME;
        self.teams
            .entry(name.to_string())
            .or_insert_with(|| Team::new(name, friendly))
    }

    // ── Queries used by the round engine ───────────────────────────────

    pub fn is_active(&self, id: PlayerId) -> bool {
        self.players
            .get(&id)
            .map(|p| !p.is_eliminated())
            .unwrap_or(false)
    }

    /// Non-eliminated players, in id order.
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| !p.is_eliminated())
            .map(|p| p.id)
            .collect()
    }

    /// Whether `a` may legally fire at `b`.
    pub fn are_opponents(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return false;
        }
        let (Some(pa), Some(pb)) = (self.players.get(&a), self.players.get(&b)) else {
            return false;
        };
        if pa.team != pb.team {
            return true;
        }
        !self.teams.get(&pa.team).map(|t| t.friendly).unwrap_or(false)
    }

    /// A round is decided once no two active players can fire at each other.
    pub fn round_decided(&self) -> bool {
        let active = self.active_players();
        !active
            .iter()
            .enumerate()
            .any(|(i, &a)| active[i + 1..].iter().any(|&b| self.are_opponents(a, b)))
    }

    /// Check a controller's answer against the rules and build the shot.
    pub fn validate_shot(&self, shooter: PlayerId, target: Target) -> Result<Shot, ShotError> {
        let receiver = target.receiver;
        if receiver == shooter {
            return Err(ShotError::SelfTarget);
        }
        let Some(receiving) = self.players.get(&receiver) else {
            return Err(ShotError::UnknownReceiver { receiver });
        };
        if receiving.is_eliminated() {
            return Err(ShotError::EliminatedReceiver { receiver });
        }
        if !self.are_opponents(shooter, receiver) {
            return Err(ShotError::FriendlyFire { receiver });
        }
        if !target
            .coords
            .in_bounds(self.config.field_width, self.config.field_height)
        {
            return Err(ShotError::OutOfBounds { at: target.coords });
        }
        let already_fired = self
            .players
            .get(&shooter)
            .map(|p| p.field.has_fired_at(receiver, target.coords))
            .unwrap_or(false);
        if already_fired {
            return Err(ShotError::Repeated {
                receiver,
                at: target.coords,
            });
        }
        Ok(Shot {
            shooter,
            receiver,
            coords: target.coords,
        })
    }

    /// Rounds won per player.
    pub fn scores(&self) -> BTreeMap<PlayerId, u32> {
        self.players
            .values()
            .map(|p| (p.id, p.rounds_won))
            .collect()
    }
}
