// Immutable facts emitted by the round engine. Match state only changes by
// applying these, and observers only learn about the match through them.

use serde::{Deserialize, Serialize};

use super::config::GameMode;
use super::error::{ControllerFault, PlacementError, ShotError};
use super::field::Shot;
use super::geometry::Ship;
use super::player::PlayerId;

/// Why a player left the active rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossReason {
    /// Every ship was sunk; `by` fired the last shot.
    FleetDestroyed { by: PlayerId },
    TimedOut { method: String },
    Faulted { method: String, message: String },
    /// The controller was still stuck in an earlier, abandoned call.
    Busy { method: String },
    InvalidPlacement { error: PlacementError },
    InvalidShot { error: ShotError },
}

impl LossReason {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            LossReason::FleetDestroyed { .. } => "fleet_destroyed",
            LossReason::TimedOut { .. } => "timed_out",
            LossReason::Faulted { .. } => "faulted",
            LossReason::Busy { .. } => "busy",
            LossReason::InvalidPlacement { .. } => "invalid_placement",
            LossReason::InvalidShot { .. } => "invalid_shot",
        }
    }

    pub fn is_disqualification(&self) -> bool {
        !matches!(self, LossReason::FleetDestroyed { .. })
    }
}

impl From<&ControllerFault> for LossReason {
    fn from(fault: &ControllerFault) -> Self {
        match fault {
            ControllerFault::TimedOut { method, .. } => LossReason::TimedOut {
                method: method.to_string(),
            },
            ControllerFault::Faulted {
                method, message, ..
            } => LossReason::Faulted {
                method: method.to_string(),
                message: message.clone(),
            },
            ControllerFault::Busy { method, .. } => LossReason::Busy {
                method: method.to_string(),
            },
        }
    }
}

/// Whether a layout passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PlacementVerdict {
    Valid,
    Invalid { error: PlacementError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PlayerJoined {
        player: PlayerId,
        name: String,
        team: Option<String>,
    },
    MatchBegin {
        mode: GameMode,
        rounds: u32,
    },
    /// `participants` are the players entering ship placement this round.
    RoundBegin {
        round: u32,
        participants: Vec<PlayerId>,
    },
    PlayerShipsPlaced {
        player: PlayerId,
        ships: Vec<Ship>,
        verdict: PlacementVerdict,
    },
    TurnOrderDecided {
        order: Vec<PlayerId>,
    },
    PlayerShot {
        shot: Shot,
    },
    PlayerHitShip {
        shot: Shot,
        ship_index: usize,
    },
    PlayerShipDestroyed {
        shot: Shot,
        ship_index: usize,
        ship: Ship,
    },
    PlayerTimeout {
        player: PlayerId,
        method: String,
        elapsed_ms: u64,
        budget_ms: u64,
    },
    PlayerLost {
        player: PlayerId,
        round: u32,
        reason: LossReason,
    },
    RoundEnd {
        round: u32,
        winners: Vec<PlayerId>,
        stopped: bool,
    },
    PlayerWon {
        player: PlayerId,
        rounds_won: u32,
    },
    MatchEnd {
        stopped: bool,
    },
}

impl Event {
    pub fn tag(&self) -> &'static str {
        match self {
            Event::PlayerJoined { .. } => "player_joined",
            Event::MatchBegin { .. } => "match_begin",
            Event::RoundBegin { .. } => "round_begin",
            Event::PlayerShipsPlaced { .. } => "player_ships_placed",
            Event::TurnOrderDecided { .. } => "turn_order_decided",
            Event::PlayerShot { .. } => "player_shot",
            Event::PlayerHitShip { .. } => "player_hit_ship",
            Event::PlayerShipDestroyed { .. } => "player_ship_destroyed",
            Event::PlayerTimeout { .. } => "player_timeout",
            Event::PlayerLost { .. } => "player_lost",
            Event::RoundEnd { .. } => "round_end",
            Event::PlayerWon { .. } => "player_won",
            Event::MatchEnd { .. } => "match_end",
        }
    }

    /// Ids of every player the fact is about, shooter first for shots.
    pub fn involved_players(&self) -> Vec<PlayerId> {
        match self {
            Event::PlayerJoined { player, .. }
            | Event::PlayerShipsPlaced { player, .. }
            | Event::PlayerTimeout { player, .. }
            | Event::PlayerLost { player, .. }
            | Event::PlayerWon { player, .. } => vec![*player],
            Event::RoundBegin { participants, .. } => participants.clone(),
            Event::TurnOrderDecided { order } => order.clone(),
            Event::PlayerShot { shot }
            | Event::PlayerHitShip { shot, .. }
            | Event::PlayerShipDestroyed { shot, .. } => vec![shot.shooter, shot.receiver],
            Event::RoundEnd { winners, .. } => winners.clone(),
            Event::MatchBegin { .. } | Event::MatchEnd { .. } => Vec::new(),
        }
    }
}

/// An event as stored in the log: numbered and tagged for consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub tag: String,
    pub players: Vec<PlayerId>,
    pub payload: Event,
}

impl EventRecord {
    pub fn new(sequence: u64, event: Event) -> Self {
        EventRecord {
            sequence,
            tag: event.tag().to_string(),
            players: event.involved_players(),
            payload: event,
        }
    }
}
