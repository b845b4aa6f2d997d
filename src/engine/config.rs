// Match configuration shared read-only by the round engine and every controller proxy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SetupError;

pub const DEFAULT_FIELD_WIDTH: u32 = 10;
pub const DEFAULT_FIELD_HEIGHT: u32 = 10;
pub const DEFAULT_STARTING_SHIPS: [u32; 5] = [2, 3, 3, 4, 5];
pub const DEFAULT_TIME_LIMIT_MS: u64 = 1000;
pub const DEFAULT_ROUNDS: u32 = 1;

/// Capacity of the broadcast channel feeding event subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Name of the team every eliminated player is moved to.
pub const DEAD_TEAM_NAME: &str = "Dead";
/// Name of the single team used outside of team play.
pub const FREE_FOR_ALL_TEAM_NAME: &str = "Free For All";

/// Game modes a controller may declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Exactly two players, everyone against everyone.
    Duel,
    /// Any number of players, everyone against everyone.
    FreeForAll,
    /// Players grouped into friendly teams; same-team fire is illegal.
    Teams,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Duel => "duel",
            GameMode::FreeForAll => "free_for_all",
            GameMode::Teams => "teams",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "duel" | "1v1" => Some(GameMode::Duel),
            "free_for_all" | "ffa" => Some(GameMode::FreeForAll),
            "teams" => Some(GameMode::Teams),
            _ => None,
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-match settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub field_width: u32,
    pub field_height: u32,
    /// Ship lengths every player must place, in order.
    pub starting_ships: Vec<u32>,
    /// Wall-clock budget for a single controller call.
    #[serde(with = "duration_ms")]
    pub time_limit: Duration,
    pub rounds: u32,
    pub mode: GameMode,
    /// Seed for turn-order shuffling. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            field_width: DEFAULT_FIELD_WIDTH,
            field_height: DEFAULT_FIELD_HEIGHT,
            starting_ships: DEFAULT_STARTING_SHIPS.to_vec(),
            time_limit: Duration::from_millis(DEFAULT_TIME_LIMIT_MS),
            rounds: DEFAULT_ROUNDS,
            mode: GameMode::FreeForAll,
            seed: None,
        }
    }
}

impl MatchConfig {
    /// Check the settings can describe a playable round.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.field_width == 0 || self.field_height == 0 {
            return Err(SetupError::InvalidConfig(format!(
                "field must be at least 1x1, got {}x{}",
                self.field_width, self.field_height
            )));
        }
        if self.starting_ships.is_empty() {
            return Err(SetupError::InvalidConfig(
                "starting fleet is empty".to_string(),
            ));
        }
        let longest_side = self.field_width.max(self.field_height);
        for &len in &self.starting_ships {
            if len == 0 {
                return Err(SetupError::InvalidConfig(
                    "ship lengths must be positive".to_string(),
                ));
            }
            if len > longest_side {
                return Err(SetupError::InvalidConfig(format!(
                    "ship of length {len} does not fit a {}x{} field",
                    self.field_width, self.field_height
                )));
            }
        }
        let fleet_cells: u64 = self.starting_ships.iter().map(|&l| l as u64).sum();
        if fleet_cells > self.field_width as u64 * self.field_height as u64 {
            return Err(SetupError::InvalidConfig(format!(
                "fleet needs {fleet_cells} cells but the field only has {}",
                self.field_width as u64 * self.field_height as u64
            )));
        }
        if self.time_limit.is_zero() {
            return Err(SetupError::InvalidConfig(
                "time limit must be greater than zero".to_string(),
            ));
        }
        if self.rounds == 0 {
            return Err(SetupError::InvalidConfig(
                "match needs at least one round".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
