// The contract between the round engine and untrusted player code.

use serde::{Deserialize, Serialize};

use super::config::{GameMode, MatchConfig};
use super::field::{Shot, Target};
use super::geometry::Ship;
use super::player::PlayerId;

/// Identification a controller reports before it is admitted to a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<GameMode>,
}

impl ControllerInfo {
    pub fn new(name: &str, version: &str, capabilities: &[GameMode]) -> Self {
        ControllerInfo {
            name: name.to_string(),
            version: version.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    pub fn supports(&self, mode: GameMode) -> bool {
        self.capabilities.contains(&mode)
    }
}

/// Player-supplied decision logic.
///
/// Every method runs on the controller's own worker thread under the match
/// time limit. Panicking is how a controller reports failure; a panic or an
/// overrun disqualifies the player for the round. Notification methods have
/// empty default bodies.
pub trait Controller: Send {
    fn info(&self) -> ControllerInfo;

    /// Called once before the first round with the player's assigned id.
    fn new_match(&mut self, _config: &MatchConfig, _player: PlayerId) {}

    fn new_round(&mut self) {}

    /// Lay out the fleet. Lengths must match `MatchConfig::starting_ships`.
    fn place_ships(&mut self) -> Vec<Ship>;

    /// Pick a target among `opponents`, the players this controller may
    /// currently fire at.
    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target;

    /// Another player fired at this controller's field.
    fn opponent_shot(&mut self, _shot: Shot) {}

    fn shot_hit(&mut self, _shot: Shot, _sunk: bool) {}

    fn shot_miss(&mut self, _shot: Shot) {}

    fn round_won(&mut self) {}

    fn round_lost(&mut self) {}

    fn match_over(&mut self) {}
}

/// A controller entered into a match, with an optional team for team play.
pub struct PlayerEntry {
    pub name: String,
    pub team: Option<String>,
    pub controller: Box<dyn Controller>,
}

impl PlayerEntry {
    pub fn new(name: &str, controller: Box<dyn Controller>) -> Self {
        PlayerEntry {
            name: name.to_string(),
            team: None,
            controller,
        }
    }

    pub fn with_team(mut self, team: &str) -> Self {
        self.team = Some(team.to_string());
        self
    }
}

impl std::fmt::Debug for PlayerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerEntry")
            .field("name", &self.name)
            .field("team", &self.team)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_supports() {
        let info = ControllerInfo::new("x", "1.0", &[GameMode::Duel, GameMode::FreeForAll]);
        assert!(info.supports(GameMode::Duel));
        assert!(!info.supports(GameMode::Teams));
    }
}
