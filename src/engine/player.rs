// Players and teams as held in match state.

use serde::{Deserialize, Serialize};

use super::config::DEAD_TEAM_NAME;
use super::field::Field;

pub type PlayerId = u32;

/// A participant in a match. Identity is fixed for the match; the team and
/// field are rewritten by events every round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Team the player was entered with. Only used in team play.
    pub home_team: Option<String>,
    /// Team the player currently belongs to.
    pub team: String,
    pub field: Field,
    pub rounds_won: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, home_team: Option<String>) -> Self {
        Player {
            id,
            name: name.to_string(),
            home_team,
            team: DEAD_TEAM_NAME.to_string(),
            field: Field::default(),
            rounds_won: 0,
        }
    }

    pub fn is_eliminated(&self) -> bool {
        self.team == DEAD_TEAM_NAME
    }
}

/// A named group of players. Members of a friendly team may not fire at
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub members: Vec<PlayerId>,
    pub friendly: bool,
}

impl Team {
    pub fn new(name: &str, friendly: bool) -> Self {
        Team {
            name: name.to_string(),
            members: Vec::new(),
            friendly,
        }
    }

    pub fn dead() -> Self {
        Team::new(DEAD_TEAM_NAME, true)
    }

    pub fn is_dead(&self) -> bool {
        self.name == DEAD_TEAM_NAME
    }

    pub fn add(&mut self, id: PlayerId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    pub fn remove(&mut self, id: PlayerId) {
        self.members.retain(|&m| m != id);
    }
}
