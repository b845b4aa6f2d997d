// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::config::{GameMode, MatchConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Settings every match started by the binary uses.
    pub match_config: MatchConfig,
    /// Built-in controller names to enter, in order.
    pub bots: Vec<String>,
    /// Where to write the gzipped replay of a single match.
    pub replay_path: Option<PathBuf>,
    /// Headless worker threads for pairwise play.
    pub workers: usize,
    /// Play every pair of bots against each other instead of one shared match.
    pub pairwise: bool,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `ARMADA_ROUNDS` - rounds per match (default: 1)
    /// - `ARMADA_TIME_LIMIT_MS` - per-call budget in ms (default: 1000)
    /// - `ARMADA_FIELD_SIZE` - field size as `WxH` (default: `10x10`)
    /// - `ARMADA_MODE` - `duel`, `ffa` or `teams` (default: free for all)
    /// - `ARMADA_SEED` - turn-order seed
    /// - `ARMADA_REPLAY_PATH` - replay output file
    /// - `ARMADA_BOTS` - comma separated bot names (default: `random,hunter`)
    /// - `ARMADA_WORKERS` - worker threads (default: available parallelism)
    ///
    /// CLI flags override them: `--rounds`, `--time-limit-ms`, `--size`,
    /// `--mode`, `--seed`, `--replay`, `--bots`, `--workers`, and the bare
    /// `--pairwise` switch.
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from explicit argument and environment sources.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let value = |flag: &str, key: &str| Self::parse_cli_value(args, flag).or_else(|| env(key));
        let defaults = MatchConfig::default();

        let rounds = value("--rounds", "ARMADA_ROUNDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rounds);

        let time_limit = value("--time-limit-ms", "ARMADA_TIME_LIMIT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.time_limit);

        let (field_width, field_height) = value("--size", "ARMADA_FIELD_SIZE")
            .and_then(|v| Self::parse_size(&v))
            .unwrap_or((defaults.field_width, defaults.field_height));

        let mode = value("--mode", "ARMADA_MODE")
            .and_then(|v| GameMode::from_str_name(&v))
            .unwrap_or(defaults.mode);

        let seed = value("--seed", "ARMADA_SEED").and_then(|v| v.parse().ok());

        let replay_path = value("--replay", "ARMADA_REPLAY_PATH").map(PathBuf::from);

        let bots = value("--bots", "ARMADA_BOTS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["random".to_string(), "hunter".to_string()]);

        let workers = value("--workers", "ARMADA_WORKERS")
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            });

        let pairwise = args.iter().any(|a| a == "--pairwise");

        Config {
            match_config: MatchConfig {
                field_width,
                field_height,
                time_limit,
                rounds,
                mode,
                seed,
                ..defaults
            },
            bots,
            replay_path,
            workers,
            pairwise,
        }
    }

    /// Parse a CLI flag value like `--rounds 5`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    /// Parse `WxH`.
    fn parse_size(s: &str) -> Option<(u32, u32)> {
        let (w, h) = s.split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}
