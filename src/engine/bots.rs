// Built-in controllers: two playing bots and a set of misbehaving fixtures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::config::{GameMode, MatchConfig};
use super::controller::{Controller, ControllerInfo};
use super::field::{Shot, Target};
use super::geometry::{Coordinates, Orientation, Ship};
use super::player::PlayerId;

const ALL_MODES: [GameMode; 3] = [GameMode::Duel, GameMode::FreeForAll, GameMode::Teams];

/// Names accepted by [`by_name`].
pub const BOT_NAMES: [&str; 7] = [
    "random",
    "hunter",
    "sleepy",
    "panicky",
    "overlap",
    "repeat",
    "self-shooter",
];

/// Resolve a built-in controller by name.
pub fn by_name(name: &str, seed: u64) -> Option<Box<dyn Controller>> {
    let bot: Box<dyn Controller> = match name {
        "random" => Box::new(RandomBot::new(seed)),
        "hunter" => Box::new(HunterBot::new(seed)),
        "sleepy" => Box::new(SleepyBot::new("make_shot", Duration::from_secs(2)).seeded(seed)),
        "panicky" => Box::new(PanickyBot::new("make_shot").seeded(seed)),
        "overlap" => Box::new(OverlapBot::new(seed)),
        "repeat" => Box::new(RepeatBot::new(seed)),
        "self-shooter" => Box::new(SelfShooterBot::new(seed)),
        _ => return None,
    };
    Some(bot)
}

/// Random non-overlapping layout of the configured fleet. Longest ships are
/// placed first; if random tries run out the field is scanned in order.
pub fn random_layout(config: &MatchConfig, rng: &mut StdRng) -> Vec<Ship> {
    let mut lengths: Vec<(usize, u32)> = config.starting_ships.iter().copied().enumerate().collect();
    lengths.sort_by(|a, b| b.1.cmp(&a.1));

    let mut placed: Vec<(usize, Ship)> = Vec::with_capacity(lengths.len());
    let mut occupied: HashSet<Coordinates> = HashSet::new();
    let (w, h) = (config.field_width as i32, config.field_height as i32);

    for (index, length) in lengths {
        let fits = |ship: &Ship, occupied: &HashSet<Coordinates>| {
            ship.in_bounds(config.field_width, config.field_height)
                && ship.cells().iter().all(|c| !occupied.contains(c))
        };

        let mut chosen = None;
        for _ in 0..200 {
            let orientation = if rng.gen_bool(0.5) {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let at = Coordinates::new(rng.gen_range(0..w), rng.gen_range(0..h));
            let ship = Ship::new(length, at, orientation);
            if fits(&ship, &occupied) {
                chosen = Some(ship);
                break;
            }
        }
        if chosen.is_none() {
            chosen = (0..h)
                .flat_map(|y| (0..w).map(move |x| Coordinates::new(x, y)))
                .flat_map(|at| {
                    [Orientation::Horizontal, Orientation::Vertical]
                        .into_iter()
                        .map(move |o| Ship::new(length, at, o))
                })
                .find(|ship| fits(ship, &occupied));
        }
        // A fleet that cannot be packed is returned short and gets rejected.
        if let Some(ship) = chosen {
            occupied.extend(ship.cells());
            placed.push((index, ship));
        }
    }

    placed.sort_by_key(|(index, _)| *index);
    placed.into_iter().map(|(_, ship)| ship).collect()
}

fn all_cells(config: &MatchConfig) -> Vec<Coordinates> {
    (0..config.field_height as i32)
        .flat_map(|y| (0..config.field_width as i32).map(move |x| Coordinates::new(x, y)))
        .collect()
}

/// Per-opponent memory of cells already fired at this round.
#[derive(Debug, Default)]
struct ShotMemory {
    tried: HashMap<PlayerId, HashSet<Coordinates>>,
}

impl ShotMemory {
    fn clear(&mut self) {
        self.tried.clear();
    }

    fn record(&mut self, receiver: PlayerId, at: Coordinates) {
        self.tried.entry(receiver).or_default().insert(at);
    }

    fn tried(&self, receiver: PlayerId, at: Coordinates) -> bool {
        self.tried
            .get(&receiver)
            .map(|cells| cells.contains(&at))
            .unwrap_or(false)
    }

    fn untried(&self, config: &MatchConfig, receiver: PlayerId) -> Vec<Coordinates> {
        all_cells(config)
            .into_iter()
            .filter(|&c| !self.tried(receiver, c))
            .collect()
    }
}

/// Random placement, random untried cell at a random opponent.
pub struct RandomBot {
    rng: StdRng,
    config: MatchConfig,
    memory: ShotMemory,
}

impl RandomBot {
    pub fn new(seed: u64) -> Self {
        RandomBot {
            rng: StdRng::seed_from_u64(seed),
            config: MatchConfig::default(),
            memory: ShotMemory::default(),
        }
    }

    fn pick(&mut self, opponents: &[PlayerId]) -> Target {
        let mut candidates: Vec<PlayerId> = opponents
            .iter()
            .copied()
            .filter(|&o| !self.memory.untried(&self.config, o).is_empty())
            .collect();
        if candidates.is_empty() {
            candidates = opponents.to_vec();
        }
        let receiver = candidates.choose(&mut self.rng).copied().unwrap_or_default();
        let cells = self.memory.untried(&self.config, receiver);
        let at = cells
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Coordinates::new(0, 0));
        self.memory.record(receiver, at);
        Target::new(receiver, at)
    }
}

impl Controller for RandomBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("random", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, _player: PlayerId) {
        self.config = config.clone();
    }

    fn new_round(&mut self) {
        self.memory.clear();
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        random_layout(&self.config, &mut self.rng)
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        self.pick(opponents)
    }
}

/// Hunt/target bot: parity search until a hit, then tries the hit cell's
/// neighbours until the ship sinks.
pub struct HunterBot {
    rng: StdRng,
    config: MatchConfig,
    memory: ShotMemory,
    pending: HashMap<PlayerId, Vec<Coordinates>>,
}

impl HunterBot {
    pub fn new(seed: u64) -> Self {
        HunterBot {
            rng: StdRng::seed_from_u64(seed),
            config: MatchConfig::default(),
            memory: ShotMemory::default(),
            pending: HashMap::new(),
        }
    }

    fn next_pending(&mut self, opponents: &[PlayerId]) -> Option<Target> {
        for &receiver in opponents {
            let Some(stack) = self.pending.get_mut(&receiver) else {
                continue;
            };
            while let Some(at) = stack.pop() {
                if !self.memory.tried(receiver, at) {
                    return Some(Target::new(receiver, at));
                }
            }
        }
        None
    }
}

impl Controller for HunterBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("hunter", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, _player: PlayerId) {
        self.config = config.clone();
    }

    fn new_round(&mut self) {
        self.memory.clear();
        self.pending.clear();
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        random_layout(&self.config, &mut self.rng)
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        let target = self.next_pending(opponents).unwrap_or_else(|| {
            let receiver = opponents
                .iter()
                .copied()
                .find(|&o| !self.memory.untried(&self.config, o).is_empty())
                .or_else(|| opponents.first().copied())
                .unwrap_or_default();
            let untried = self.memory.untried(&self.config, receiver);
            let parity: Vec<Coordinates> = untried
                .iter()
                .copied()
                .filter(|c| (c.x + c.y) % 2 == 0)
                .collect();
            let pool = if parity.is_empty() { &untried } else { &parity };
            let at = pool
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(Coordinates::new(0, 0));
            Target::new(receiver, at)
        });
        self.memory.record(target.receiver, target.coords);
        target
    }

    fn shot_hit(&mut self, shot: Shot, sunk: bool) {
        let stack = self.pending.entry(shot.receiver).or_default();
        if sunk {
            stack.clear();
            return;
        }
        for n in shot.coords.neighbours() {
            if n.in_bounds(self.config.field_width, self.config.field_height)
                && !self.memory.tried(shot.receiver, n)
            {
                stack.push(n);
            }
        }
    }
}

/// Plays like [`RandomBot`] but sleeps in one lifecycle method.
pub struct SleepyBot {
    method: &'static str,
    delay: Duration,
    inner: RandomBot,
}

impl SleepyBot {
    pub fn new(method: &'static str, delay: Duration) -> Self {
        SleepyBot {
            method,
            delay,
            inner: RandomBot::new(0),
        }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.inner = RandomBot::new(seed);
        self
    }

    fn maybe_sleep(&self, method: &str) {
        if self.method == method {
            std::thread::sleep(self.delay);
        }
    }
}

impl Controller for SleepyBot {
    fn info(&self) -> ControllerInfo {
        self.maybe_sleep("info");
        ControllerInfo::new("sleepy", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, player: PlayerId) {
        self.maybe_sleep("new_match");
        self.inner.new_match(config, player);
    }

    fn new_round(&mut self) {
        self.maybe_sleep("new_round");
        self.inner.new_round();
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.maybe_sleep("place_ships");
        self.inner.place_ships()
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        self.maybe_sleep("make_shot");
        self.inner.make_shot(opponents)
    }

    fn round_won(&mut self) {
        self.maybe_sleep("round_won");
    }

    fn round_lost(&mut self) {
        self.maybe_sleep("round_lost");
    }

    fn match_over(&mut self) {
        self.maybe_sleep("match_over");
    }
}

/// Plays like [`RandomBot`] but panics in one lifecycle method.
pub struct PanickyBot {
    method: &'static str,
    inner: RandomBot,
}

impl PanickyBot {
    pub fn new(method: &'static str) -> Self {
        PanickyBot {
            method,
            inner: RandomBot::new(0),
        }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.inner = RandomBot::new(seed);
        self
    }

    fn maybe_panic(&self, method: &str) {
        if self.method == method {
            panic!("{method} exploded");
        }
    }
}

impl Controller for PanickyBot {
    fn info(&self) -> ControllerInfo {
        self.maybe_panic("info");
        ControllerInfo::new("panicky", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, player: PlayerId) {
        self.maybe_panic("new_match");
        self.inner.new_match(config, player);
    }

    fn new_round(&mut self) {
        self.maybe_panic("new_round");
        self.inner.new_round();
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.maybe_panic("place_ships");
        self.inner.place_ships()
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        self.maybe_panic("make_shot");
        self.inner.make_shot(opponents)
    }

    fn round_won(&mut self) {
        self.maybe_panic("round_won");
    }

    fn round_lost(&mut self) {
        self.maybe_panic("round_lost");
    }

    fn match_over(&mut self) {
        self.maybe_panic("match_over");
    }
}

/// Stacks every ship on the top-left corner.
pub struct OverlapBot {
    inner: RandomBot,
}

impl OverlapBot {
    pub fn new(seed: u64) -> Self {
        OverlapBot {
            inner: RandomBot::new(seed),
        }
    }
}

impl Controller for OverlapBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("overlap", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, player: PlayerId) {
        self.inner.new_match(config, player);
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.inner
            .config
            .starting_ships
            .iter()
            .map(|&length| Ship::new(length, Coordinates::new(0, 0), Orientation::Horizontal))
            .collect()
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        self.inner.make_shot(opponents)
    }
}

/// Valid layout, then fires at the same cell of the first opponent forever.
pub struct RepeatBot {
    inner: RandomBot,
}

impl RepeatBot {
    pub fn new(seed: u64) -> Self {
        RepeatBot {
            inner: RandomBot::new(seed),
        }
    }
}

impl Controller for RepeatBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("repeat", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, player: PlayerId) {
        self.inner.new_match(config, player);
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.inner.place_ships()
    }

    fn make_shot(&mut self, opponents: &[PlayerId]) -> Target {
        Target::new(
            opponents.first().copied().unwrap_or_default(),
            Coordinates::new(0, 0),
        )
    }
}

/// Valid layout, then fires at its own field.
pub struct SelfShooterBot {
    me: PlayerId,
    inner: RandomBot,
}

impl SelfShooterBot {
    pub fn new(seed: u64) -> Self {
        SelfShooterBot {
            me: 0,
            inner: RandomBot::new(seed),
        }
    }
}

impl Controller for SelfShooterBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("self-shooter", "1.0", &ALL_MODES)
    }

    fn new_match(&mut self, config: &MatchConfig, player: PlayerId) {
        self.me = player;
        self.inner.new_match(config, player);
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.inner.place_ships()
    }

    fn make_shot(&mut self, _opponents: &[PlayerId]) -> Target {
        Target::new(self.me, Coordinates::new(0, 0))
    }
}

/// Fixed layout and a fixed list of shots, replayed every round. Panics once
/// the shot list runs out.
pub struct ScriptedBot {
    ships: Vec<Ship>,
    script: Vec<Target>,
    remaining: VecDeque<Target>,
}

impl ScriptedBot {
    pub fn new(ships: Vec<Ship>, shots: Vec<Target>) -> Self {
        ScriptedBot {
            ships,
            remaining: shots.iter().copied().collect(),
            script: shots,
        }
    }
}

impl Controller for ScriptedBot {
    fn info(&self) -> ControllerInfo {
        ControllerInfo::new("scripted", "1.0", &ALL_MODES)
    }

    fn new_round(&mut self) {
        self.remaining = self.script.iter().copied().collect();
    }

    fn place_ships(&mut self) -> Vec<Ship> {
        self.ships.clone()
    }

    fn make_shot(&mut self, _opponents: &[PlayerId]) -> Target {
        match self.remaining.pop_front() {
            Some(target) => target,
            None => panic!("script exhausted"),
        }
    }
}
