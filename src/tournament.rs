// Tournament support: round-robin pairings between controllers and standings
// aggregated over the resulting matches.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::game::MatchSummary;

/// Generate round-robin pairings (all vs all).
///
/// Every participant plays against every other participant exactly once.
pub fn generate_round_robin_pairings<T: Clone>(participants: &[T]) -> Vec<(T, T)> {
    let mut pairs = Vec::new();
    for i in 0..participants.len() {
        for j in (i + 1)..participants.len() {
            pairs.push((participants[i].clone(), participants[j].clone()));
        }
    }
    pairs
}

/// Accumulated results for one entrant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub name: String,
    pub matches_played: u32,
    pub matches_won: u32,
    pub rounds_won: u32,
    /// Controller calls that timed out or panicked.
    pub faults: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Standings {
    entries: BTreeMap<String, Standing>,
}

impl Standings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished match into the table. Players are keyed by name.
    pub fn record(&mut self, summary: &MatchSummary) {
        for player in &summary.players {
            let entry = self
                .entries
                .entry(player.name.clone())
                .or_insert_with(|| Standing {
                    name: player.name.clone(),
                    ..Standing::default()
                });
            entry.matches_played += 1;
            entry.rounds_won += player.rounds_won;
            entry.faults += player.calls.timeouts + player.calls.faults;
            if summary.winners.contains(&player.id) {
                entry.matches_won += 1;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Standing> {
        self.entries.get(name)
    }

    /// Entries ordered by matches won, then rounds won, then name.
    pub fn ranked(&self) -> Vec<Standing> {
        let mut ranked: Vec<Standing> = self.entries.values().cloned().collect();
        ranked.sort_by(|a, b| {
            b.matches_won
                .cmp(&a.matches_won)
                .then(b.rounds_won.cmp(&a.rounds_won))
                .then(a.name.cmp(&b.name))
        });
        ranked
    }
}
