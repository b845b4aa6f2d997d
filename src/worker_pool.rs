// Worker pool for parallel headless match execution.
//
// Each match runs on a dedicated OS thread. The pool has a fixed capacity;
// `spawn_match` refuses work once every worker is busy.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::game::Match;
use crate::engine::server::{play_headless, MatchResult};
use crate::metrics;

/// Manages a fixed-size pool of OS threads for headless match execution.
pub struct WorkerPool {
    worker_count: usize,
    active_workers: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether the pool has capacity to accept another match.
    pub fn has_capacity(&self) -> bool {
        self.active_workers.load(Ordering::Acquire) < self.worker_count
    }

    /// Current number of active workers.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Run `game` on a new OS thread. Returns false if the pool is at capacity.
    ///
    /// Must be called from within a tokio runtime: `on_complete` is spawned
    /// onto it once the match finishes.
    pub fn spawn_match<F>(&self, game: Match, on_complete: F) -> bool
    where
        F: FnOnce(MatchResult) + Send + 'static,
    {
        let limit = self.worker_count;
        let reserved = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });
        let Ok(previous) = reserved else {
            return false;
        };
        metrics::MATCH_WORKERS_ACTIVE.set(previous as i64 + 1);

        let active = Arc::clone(&self.active_workers);
        let rt_handle = tokio::runtime::Handle::current();
        let match_id = game.id();

        let spawned = std::thread::Builder::new()
            .name(format!("headless-match-{match_id}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| play_headless(game)));

                let remaining = active.fetch_sub(1, Ordering::AcqRel) - 1;
                metrics::MATCH_WORKERS_ACTIVE.set(remaining as i64);

                match result {
                    Ok(result) => {
                        rt_handle.spawn(async move {
                            on_complete(result);
                        });
                    }
                    Err(_) => {
                        tracing::error!(%match_id, "Headless match worker died, aborting");
                        std::process::abort();
                    }
                }
            });

        if let Err(e) = spawned {
            tracing::error!(%match_id, "Failed to spawn headless match thread: {e}");
            let remaining = self.active_workers.fetch_sub(1, Ordering::AcqRel) - 1;
            metrics::MATCH_WORKERS_ACTIVE.set(remaining as i64);
            return false;
        }
        true
    }
}
