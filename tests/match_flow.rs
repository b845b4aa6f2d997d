// Integration tests for full matches driven through the public engine API:
// event ordering at round end, disqualifications, timeouts and seeded
// whole-match properties.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_arena::engine::bots::{
    HunterBot, OverlapBot, RandomBot, RepeatBot, ScriptedBot, SelfShooterBot, SleepyBot,
};
use armada_arena::engine::config::{GameMode, MatchConfig};
use armada_arena::engine::controller::{Controller, PlayerEntry};
use armada_arena::engine::event::{Event, EventRecord, LossReason, PlacementVerdict};
use armada_arena::engine::field::Target;
use armada_arena::engine::game::{Match, MatchObserver};
use armada_arena::engine::geometry::{Coordinates, Orientation, Ship};
use armada_arena::engine::player::PlayerId;
use armada_arena::engine::state::MatchState;

fn one_cell(x: i32, y: i32) -> Vec<Ship> {
    vec![Ship::new(1, Coordinates::new(x, y), Orientation::Horizontal)]
}

fn entries(controllers: Vec<Box<dyn Controller>>) -> Vec<PlayerEntry> {
    controllers
        .into_iter()
        .enumerate()
        .map(|(i, c)| PlayerEntry::new(&format!("P{}", i + 1), c))
        .collect()
}

fn payloads(records: &[EventRecord]) -> Vec<&Event> {
    records.iter().map(|r| &r.payload).collect()
}

#[derive(Clone, Default)]
struct TurnTracker {
    turns: Arc<Mutex<Vec<(u32, PlayerId)>>>,
}

impl MatchObserver for TurnTracker {
    fn turn_advanced(&self, round: u32, player: PlayerId) {
        self.turns.lock().unwrap().push((round, player));
    }
}

// ── Round end ordering ──────────────────────────────────────────────

#[test]
fn test_sinking_last_ship_ends_round_in_order() {
    let config = MatchConfig {
        field_width: 2,
        field_height: 2,
        starting_ships: vec![1],
        mode: GameMode::Duel,
        seed: Some(4),
        ..MatchConfig::default()
    };
    let a = ScriptedBot::new(one_cell(0, 0), vec![Target::new(2, Coordinates::new(1, 1))]);
    let b = ScriptedBot::new(one_cell(1, 1), vec![Target::new(1, Coordinates::new(0, 0))]);
    let mut game = Match::new(config, entries(vec![Box::new(a), Box::new(b)])).unwrap();
    let summary = game.run();

    let records = game.records();
    let events = payloads(&records);
    let shot_at = events
        .iter()
        .position(|e| matches!(e, Event::PlayerShot { .. }))
        .expect("one shot fired");
    let Event::PlayerShot { shot } = events[shot_at] else {
        unreachable!()
    };
    let (winner, loser) = (shot.shooter, shot.receiver);

    assert!(matches!(events[shot_at + 1], Event::PlayerHitShip { .. }));
    assert!(matches!(events[shot_at + 2], Event::PlayerShipDestroyed { .. }));
    assert_eq!(
        events[shot_at + 3],
        &Event::PlayerLost {
            player: loser,
            round: 1,
            reason: LossReason::FleetDestroyed { by: winner },
        }
    );
    assert_eq!(
        events[shot_at + 4],
        &Event::RoundEnd {
            round: 1,
            winners: vec![winner],
            stopped: false,
        }
    );
    assert_eq!(
        events[shot_at + 5],
        &Event::PlayerWon {
            player: winner,
            rounds_won: 1,
        }
    );
    assert_eq!(events[shot_at + 6], &Event::MatchEnd { stopped: false });
    assert_eq!(events.len(), shot_at + 7);
    assert_eq!(summary.winners, vec![winner]);
}

// ── Disqualification ────────────────────────────────────────────────

#[test]
fn test_overlapping_fleet_loses_without_a_shot() {
    let config = MatchConfig {
        seed: Some(2),
        ..MatchConfig::default()
    };
    let mut game = Match::new(
        config,
        entries(vec![Box::new(OverlapBot::new(1)), Box::new(RandomBot::new(2))]),
    )
    .unwrap();
    let summary = game.run();
    let records = game.records();
    let events = payloads(&records);

    assert!(events.iter().any(|e| matches!(
        e,
        Event::PlayerShipsPlaced {
            player: 1,
            verdict: PlacementVerdict::Invalid { .. },
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PlayerLost {
            player: 1,
            reason: LossReason::InvalidPlacement { .. },
            ..
        }
    )));
    assert!(!events.iter().any(|e| matches!(e, Event::PlayerShot { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::RoundEnd { winners, stopped: false, .. } if winners == &vec![2]
    )));
    assert_eq!(summary.winners, vec![2]);
}

#[test]
fn test_repeated_shot_disqualifies() {
    let config = MatchConfig {
        seed: Some(8),
        ..MatchConfig::default()
    };
    let mut game = Match::new(
        config,
        entries(vec![Box::new(RepeatBot::new(1)), Box::new(HunterBot::new(2))]),
    )
    .unwrap();
    let summary = game.run();
    let records = game.records();

    let lost = records.iter().find_map(|r| match &r.payload {
        Event::PlayerLost { player: 1, reason, .. } => Some(reason.clone()),
        _ => None,
    });
    assert!(matches!(lost, Some(LossReason::InvalidShot { .. })));
    assert_eq!(summary.winners, vec![2]);
}

#[test]
fn test_shooting_self_disqualifies() {
    let config = MatchConfig {
        seed: Some(8),
        ..MatchConfig::default()
    };
    let mut game = Match::new(
        config,
        entries(vec![Box::new(RandomBot::new(1)), Box::new(SelfShooterBot::new(2))]),
    )
    .unwrap();
    let summary = game.run();

    assert!(game.records().iter().any(|r| matches!(
        &r.payload,
        Event::PlayerLost {
            player: 2,
            reason: LossReason::InvalidShot { .. },
            ..
        }
    )));
    // The self shooter never fires a legal shot.
    assert!(!game.records().iter().any(|r| matches!(
        &r.payload,
        Event::PlayerShot { shot } if shot.shooter == 2
    )));
    assert_eq!(summary.winners, vec![1]);
}

#[test]
fn test_anchor_at_i32_max_is_rejected_layout() {
    let config = MatchConfig {
        field_width: 4,
        field_height: 4,
        starting_ships: vec![2],
        mode: GameMode::Duel,
        seed: Some(9),
        ..MatchConfig::default()
    };
    let far = vec![Ship::new(
        2,
        Coordinates::new(i32::MAX, 0),
        Orientation::Horizontal,
    )];
    let a = ScriptedBot::new(far, vec![Target::new(2, Coordinates::new(0, 3))]);
    let b = ScriptedBot::new(
        vec![Ship::new(2, Coordinates::new(0, 0), Orientation::Horizontal)],
        vec![Target::new(1, Coordinates::new(0, 0))],
    );
    let mut game = Match::new(config, entries(vec![Box::new(a), Box::new(b)])).unwrap();
    let summary = game.run();

    let records = game.records();
    let events = payloads(&records);
    let placed = events
        .iter()
        .position(|e| matches!(e, Event::PlayerShipsPlaced { player: 1, .. }))
        .expect("player 1 placed ships");
    assert!(matches!(
        events[placed],
        Event::PlayerShipsPlaced {
            verdict: PlacementVerdict::Invalid { .. },
            ..
        }
    ));
    assert!(matches!(
        events[placed + 1],
        Event::PlayerLost {
            player: 1,
            round: 1,
            reason: LossReason::InvalidPlacement { .. },
        }
    ));
    assert!(!events.iter().any(|e| matches!(e, Event::PlayerShot { .. })));
    assert_eq!(summary.winners, vec![2]);
}

// ── Timeouts ────────────────────────────────────────────────────────

#[test]
fn test_slow_shot_times_out_at_budget() {
    let config = MatchConfig {
        time_limit: Duration::from_millis(50),
        seed: Some(6),
        ..MatchConfig::default()
    };
    let sleepy = SleepyBot::new("make_shot", Duration::from_millis(200)).seeded(1);
    let mut game = Match::new(
        config,
        entries(vec![Box::new(sleepy), Box::new(RandomBot::new(2))]),
    )
    .unwrap();
    let summary = game.run();
    let records = game.records();

    let (elapsed_ms, budget_ms) = records
        .iter()
        .find_map(|r| match &r.payload {
            Event::PlayerTimeout {
                player: 1,
                method,
                elapsed_ms,
                budget_ms,
            } => {
                assert_eq!(method, "make_shot");
                Some((*elapsed_ms, *budget_ms))
            }
            _ => None,
        })
        .expect("sleepy bot timed out");
    assert_eq!(budget_ms, 50);
    assert!(elapsed_ms >= 50, "returned before the budget: {elapsed_ms}ms");
    assert!(elapsed_ms < 180, "waited for the late answer: {elapsed_ms}ms");

    assert!(records.iter().any(|r| matches!(
        &r.payload,
        Event::PlayerLost {
            player: 1,
            reason: LossReason::TimedOut { .. },
            ..
        }
    )));
    assert_eq!(summary.winners, vec![2]);
}

// ── Team play ───────────────────────────────────────────────────────

#[test]
fn test_team_match_never_fires_at_friends() {
    let config = MatchConfig {
        field_width: 6,
        field_height: 6,
        starting_ships: vec![2, 3],
        mode: GameMode::Teams,
        rounds: 2,
        seed: Some(12),
        ..MatchConfig::default()
    };
    let players = vec![
        PlayerEntry::new("red-1", Box::new(HunterBot::new(1))).with_team("red"),
        PlayerEntry::new("red-2", Box::new(RandomBot::new(2))).with_team("red"),
        PlayerEntry::new("blue-1", Box::new(HunterBot::new(3))).with_team("blue"),
        PlayerEntry::new("blue-2", Box::new(RandomBot::new(4))).with_team("blue"),
    ];
    let mut game = Match::new(config, players).unwrap();
    let summary = game.run();

    let team_of = |id: PlayerId| if id <= 2 { "red" } else { "blue" };
    for record in game.records() {
        if let Event::PlayerShot { shot } = &record.payload {
            assert_ne!(team_of(shot.shooter), team_of(shot.receiver));
        }
        if let Event::RoundEnd { winners, .. } = &record.payload {
            assert!(!winners.is_empty());
            let teams: HashSet<&str> = winners.iter().map(|&w| team_of(w)).collect();
            assert_eq!(teams.len(), 1, "winners span teams: {winners:?}");
        }
    }
    assert_eq!(summary.rounds_played, 2);
}

// ── Seeded properties ───────────────────────────────────────────────

fn small_config(seed: u64) -> MatchConfig {
    MatchConfig {
        field_width: 5,
        field_height: 5,
        starting_ships: vec![2, 3],
        rounds: 2,
        seed: Some(seed),
        ..MatchConfig::default()
    }
}

fn three_bots(seed: u64) -> Vec<PlayerEntry> {
    entries(vec![
        Box::new(RandomBot::new(seed)),
        Box::new(HunterBot::new(seed + 1)),
        Box::new(RandomBot::new(seed + 2)),
    ])
}

#[test]
fn test_matches_terminate_with_one_winner_per_round() {
    for seed in 0..20 {
        let mut game = Match::new(small_config(seed), three_bots(seed)).unwrap();
        let summary = game.run();

        assert_eq!(summary.rounds_played, 2, "seed {seed}");
        assert!(!summary.stopped);
        let total: u32 = summary.players.iter().map(|p| p.rounds_won).sum();
        assert_eq!(total, 2, "seed {seed}");
        assert!(matches!(
            game.records().last().map(|r| &r.payload),
            Some(Event::MatchEnd { stopped: false })
        ));
    }
}

#[test]
fn test_replay_matches_live_state_at_every_prefix() {
    for seed in 0..10 {
        let config = small_config(seed);
        let mut game = Match::new(config.clone(), three_bots(seed)).unwrap();
        game.run();
        let records = game.records();

        let mut incremental = MatchState::new(config.clone());
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.sequence, i as u64);
            incremental.apply(record).unwrap();
            let rebuilt = MatchState::replay(config.clone(), &records[..=i]).unwrap();
            assert_eq!(rebuilt, incremental, "seed {seed}, prefix {}", i + 1);
        }
        assert_eq!(&incremental, game.state());
    }
}

#[test]
fn test_turns_rotate_between_live_players() {
    for seed in 0..10 {
        let tracker = TurnTracker::default();
        let mut game = Match::new(small_config(seed), three_bots(seed)).unwrap();
        game.add_observer(Box::new(tracker.clone()));
        game.run();

        let turns = tracker.turns.lock().unwrap().clone();
        let mut shots_per_round: BTreeMap<u32, usize> = BTreeMap::new();
        let mut round = 0;
        for record in game.records() {
            match &record.payload {
                Event::RoundBegin { round: r, .. } => round = *r,
                Event::PlayerShot { .. } => *shots_per_round.entry(round).or_default() += 1,
                _ => {}
            }
        }

        let mut turns_per_round: BTreeMap<u32, usize> = BTreeMap::new();
        for window in turns.windows(2) {
            let ((r1, p1), (r2, p2)) = (window[0], window[1]);
            assert!(r2 >= r1, "rounds went backwards");
            if r1 == r2 {
                assert_ne!(p1, p2, "seed {seed}: player {p1} moved twice in a row");
            }
        }
        for (r, _) in &turns {
            *turns_per_round.entry(*r).or_default() += 1;
        }
        assert_eq!(turns_per_round, shots_per_round, "seed {seed}");
    }
}

/// Turns and records in the order the match produced them.
#[derive(Debug, Clone)]
enum Step {
    Turn(u32, PlayerId),
    Recorded(Event),
}

#[derive(Clone, Default)]
struct Timeline {
    steps: Arc<Mutex<Vec<Step>>>,
}

impl MatchObserver for Timeline {
    fn event_recorded(&self, record: &EventRecord) {
        self.steps
            .lock()
            .unwrap()
            .push(Step::Recorded(record.payload.clone()));
    }

    fn turn_advanced(&self, round: u32, player: PlayerId) {
        self.steps.lock().unwrap().push(Step::Turn(round, player));
    }
}

/// Next player after `previous` in `order` that is still in `active`.
fn successor(
    order: &[PlayerId],
    active: &HashSet<PlayerId>,
    previous: PlayerId,
) -> Option<PlayerId> {
    let at = order.iter().position(|&p| p == previous)?;
    (1..=order.len())
        .map(|k| order[(at + k) % order.len()])
        .find(|p| *p != previous && active.contains(p))
}

#[test]
fn test_disqualified_player_is_skipped_in_fixed_order() {
    const REPEAT: PlayerId = 2;
    let mut handovers = 0;

    for seed in 0..10 {
        let config = MatchConfig {
            rounds: 2,
            mode: GameMode::FreeForAll,
            seed: Some(seed),
            ..MatchConfig::default()
        };
        let timeline = Timeline::default();
        let mut game = Match::new(
            config,
            entries(vec![
                Box::new(RandomBot::new(seed)),
                Box::new(RepeatBot::new(seed + 1)),
                Box::new(RandomBot::new(seed + 2)),
            ]),
        )
        .unwrap();
        game.add_observer(Box::new(timeline.clone()));
        game.run();

        let steps = timeline.steps.lock().unwrap().clone();
        let mut orders_per_round: BTreeMap<u32, usize> = BTreeMap::new();
        let mut round = 0;
        let mut order: Vec<PlayerId> = Vec::new();
        let mut active: HashSet<PlayerId> = HashSet::new();
        let mut previous: Option<PlayerId> = None;
        let mut repeat_out = false;
        let mut after_repeat: Option<PlayerId> = None;

        for step in steps {
            match step {
                Step::Recorded(Event::RoundBegin { round: r, .. }) => {
                    round = r;
                    order.clear();
                    active.clear();
                    previous = None;
                    repeat_out = false;
                    after_repeat = None;
                }
                Step::Recorded(Event::TurnOrderDecided { order: decided }) => {
                    *orders_per_round.entry(round).or_default() += 1;
                    active = decided.iter().copied().collect();
                    order = decided;
                }
                Step::Recorded(Event::PlayerLost { player, .. }) => {
                    active.remove(&player);
                    if player == REPEAT && !order.is_empty() {
                        repeat_out = true;
                        after_repeat = previous
                            .filter(|&p| p == REPEAT)
                            .and_then(|p| successor(&order, &active, p));
                    }
                }
                Step::Turn(r, player) => {
                    assert_eq!(r, round, "seed {seed}: turn outside its round");
                    assert!(active.contains(&player), "seed {seed}: {player} is out");
                    if repeat_out {
                        assert_ne!(player, REPEAT, "seed {seed}: disqualified player moved");
                    }
                    let expected = match previous {
                        None => order.first().copied(),
                        Some(p) => successor(&order, &active, p),
                    };
                    assert_eq!(Some(player), expected, "seed {seed}, round {round}");
                    if let Some(next) = after_repeat.take() {
                        assert_eq!(player, next, "seed {seed}: turn after disqualification");
                        handovers += 1;
                    }
                    previous = Some(player);
                }
                Step::Recorded(_) => {}
            }
        }

        for (r, count) in &orders_per_round {
            assert_eq!(*count, 1, "seed {seed}: round {r} decided its order twice");
        }
        assert_eq!(orders_per_round.len(), 2, "seed {seed}");
    }
    assert!(handovers > 0, "the repeating player was never disqualified on its turn");
}

#[test]
fn test_shots_are_legal() {
    for seed in 0..20 {
        let config = small_config(seed);
        let mut game = Match::new(config.clone(), three_bots(seed)).unwrap();
        game.run();

        let mut fired: HashSet<(u32, PlayerId, PlayerId, Coordinates)> = HashSet::new();
        let mut eliminated: HashSet<PlayerId> = HashSet::new();
        let mut round = 0;
        for record in game.records() {
            match &record.payload {
                Event::RoundBegin { round: r, .. } => {
                    round = *r;
                    eliminated.clear();
                }
                Event::PlayerShot { shot } => {
                    assert_ne!(shot.shooter, shot.receiver);
                    assert!(shot.coords.in_bounds(config.field_width, config.field_height));
                    assert!(!eliminated.contains(&shot.shooter));
                    assert!(!eliminated.contains(&shot.receiver));
                    assert!(
                        fired.insert((round, shot.shooter, shot.receiver, shot.coords)),
                        "seed {seed}: repeated shot {shot:?}"
                    );
                }
                Event::PlayerLost { player, reason, .. } => {
                    assert!(!reason.is_disqualification(), "seed {seed}: {reason:?}");
                    eliminated.insert(*player);
                }
                _ => {}
            }
        }
    }
}
