use std::sync::Arc;

use armada_arena::config::Config;
use armada_arena::engine::bots;
use armada_arena::engine::config::{GameMode, MatchConfig};
use armada_arena::engine::controller::PlayerEntry;
use armada_arena::engine::game::{Match, MatchSummary};
use armada_arena::engine::server::{run_match_headless, MatchResult};
use armada_arena::metrics;
use armada_arena::tournament::{generate_round_robin_pairings, Standings};
use armada_arena::worker_pool::WorkerPool;
use tokio::sync::{mpsc, Semaphore};

/// Build entries for the named bots. Unknown names are skipped with a warning.
fn entries_for(names: &[String], base_seed: u64) -> Vec<PlayerEntry> {
    names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| match bots::by_name(name, base_seed.wrapping_add(i as u64)) {
            Some(controller) => Some(PlayerEntry::new(name, controller)),
            None => {
                tracing::warn!(
                    bot = %name,
                    known = ?bots::BOT_NAMES,
                    "Unknown bot, skipping"
                );
                None
            }
        })
        .collect()
}

fn log_summary(summary: &MatchSummary) {
    for player in &summary.players {
        tracing::info!(
            match_id = %summary.match_id,
            player = player.id,
            name = %player.name,
            rounds_won = player.rounds_won,
            retired = player.retired,
            calls = player.calls.calls,
            timeouts = player.calls.timeouts,
            faults = player.calls.faults,
            "Player result"
        );
    }
    tracing::info!(
        match_id = %summary.match_id,
        rounds = summary.rounds_played,
        winners = ?summary.winners,
        duration_ms = summary.duration_ms,
        "Match finished"
    );
}

async fn run_single(config: &Config) {
    let mut match_config = config.match_config.clone();
    if config.bots.len() == 2 && match_config.mode == GameMode::FreeForAll {
        match_config.mode = GameMode::Duel;
    }
    let entries = entries_for(&config.bots, match_config.seed.unwrap_or(0));

    let outcome =
        tokio::task::spawn_blocking(move || run_match_headless(match_config, entries)).await;
    let result: MatchResult = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!("Match setup failed: {e}");
            return;
        }
        Err(e) => {
            tracing::error!("Match task failed: {e}");
            return;
        }
    };

    log_summary(&result.summary);
    tracing::info!(events = result.event_count, "Event log complete");

    if let Some(path) = &config.replay_path {
        let data = &result.replay_data;
        if data.is_empty() {
            tracing::warn!("No replay data to write");
        } else {
            match tokio::fs::write(path, data).await {
                Ok(()) => tracing::info!(path = %path.display(), bytes = data.len(), "Replay written"),
                Err(e) => tracing::error!(path = %path.display(), "Failed to write replay: {e}"),
            }
        }
    }
}

async fn run_pairwise(config: &Config) {
    let pairs = generate_round_robin_pairings(&config.bots);
    if pairs.is_empty() {
        tracing::warn!("Pairwise play needs at least two bots");
        return;
    }

    let pool = WorkerPool::new(config.workers);
    let slots = Arc::new(Semaphore::new(config.workers));
    let (tx, mut rx) = mpsc::unbounded_channel::<MatchResult>();
    let base_seed = config.match_config.seed.unwrap_or(0);
    let mut launched = 0usize;

    for (i, (a, b)) in pairs.into_iter().enumerate() {
        let match_config = MatchConfig {
            mode: GameMode::Duel,
            ..config.match_config.clone()
        };
        let entries = entries_for(&[a.clone(), b.clone()], base_seed.wrapping_add(i as u64 * 2));
        let game = match Match::new(match_config, entries) {
            Ok(game) => game,
            Err(e) => {
                tracing::warn!(%a, %b, "Skipping pairing: {e}");
                continue;
            }
        };

        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let tx = tx.clone();
        let accepted = pool.spawn_match(game, move |result| {
            drop(permit);
            let _ = tx.send(result);
        });
        if accepted {
            launched += 1;
        } else {
            tracing::warn!(%a, %b, "Worker pool refused pairing");
        }
    }
    drop(tx);

    let mut standings = Standings::new();
    let mut finished = 0usize;
    while let Some(result) = rx.recv().await {
        log_summary(&result.summary);
        standings.record(&result.summary);
        finished += 1;
    }
    tracing::info!(launched, finished, "Pairwise play complete");

    for (rank, standing) in standings.ranked().iter().enumerate() {
        tracing::info!(
            rank = rank + 1,
            name = %standing.name,
            matches_won = standing.matches_won,
            matches_played = standing.matches_played,
            rounds_won = standing.rounds_won,
            faults = standing.faults,
            "Standing"
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();
    tracing::info!(
        bots = ?config.bots,
        rounds = config.match_config.rounds,
        mode = %config.match_config.mode,
        time_limit_ms = config.match_config.time_limit.as_millis() as u64,
        pairwise = config.pairwise,
        "Armada starting"
    );

    if config.pairwise {
        run_pairwise(&config).await;
    } else {
        run_single(&config).await;
    }

    tracing::debug!("{}", metrics::gather_metrics());
}
