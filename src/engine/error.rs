// Error taxonomy for match setup, controller calls, rule violations and replay.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::GameMode;
use super::geometry::Coordinates;
use super::player::PlayerId;

/// Match creation was rejected before any round started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("controller '{name}' does not support game mode '{mode}'")]
    ControllerIncompatible { name: String, mode: GameMode },
    #[error("match needs at least {required} players, got {found}")]
    NotEnoughPlayers { found: usize, required: usize },
    #[error("controller '{name}' could not be identified: {reason}")]
    IdentificationFailed { name: String, reason: String },
    #[error("invalid match configuration: {0}")]
    InvalidConfig(String),
}

/// A lifecycle call did not produce a usable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerFault {
    #[error("player {player} timed out in {method} after {elapsed:?} (budget {budget:?})")]
    TimedOut {
        player: PlayerId,
        method: &'static str,
        elapsed: Duration,
        budget: Duration,
    },
    #[error("player {player} faulted in {method}: {message}")]
    Faulted {
        player: PlayerId,
        method: &'static str,
        message: String,
    },
    #[error("player {player} is still running an abandoned call, {method} was not issued")]
    Busy {
        player: PlayerId,
        method: &'static str,
    },
}

impl ControllerFault {
    pub fn player(&self) -> PlayerId {
        match self {
            ControllerFault::TimedOut { player, .. }
            | ControllerFault::Faulted { player, .. }
            | ControllerFault::Busy { player, .. } => *player,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ControllerFault::TimedOut { method, .. }
            | ControllerFault::Faulted { method, .. }
            | ControllerFault::Busy { method, .. } => method,
        }
    }
}

/// Why a ship layout was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementError {
    #[error("expected ship lengths {expected:?}, got {found:?}")]
    WrongFleet { expected: Vec<u32>, found: Vec<u32> },
    #[error("ship {index} leaves the field")]
    OutOfBounds { index: usize },
    #[error("ships {first} and {second} overlap at {at}")]
    Overlap {
        first: usize,
        second: usize,
        at: Coordinates,
    },
}

/// Why a shot was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShotError {
    #[error("coordinates {at} are outside the field")]
    OutOfBounds { at: Coordinates },
    #[error("player cannot shoot at itself")]
    SelfTarget,
    #[error("player {receiver} is not in the match")]
    UnknownReceiver { receiver: PlayerId },
    #[error("player {receiver} is already eliminated")]
    EliminatedReceiver { receiver: PlayerId },
    #[error("player {receiver} is on the shooter's friendly team")]
    FriendlyFire { receiver: PlayerId },
    #[error("{at} was already fired at player {receiver}")]
    Repeated { receiver: PlayerId, at: Coordinates },
}

/// A persisted log could not be decoded or replayed.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to decompress replay: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode replay: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("record out of order: expected sequence {expected}, found {found}")]
    OutOfOrder { expected: u64, found: u64 },
    #[error("record {sequence} cannot be applied: {reason}")]
    Inconsistent { sequence: u64, reason: String },
}
