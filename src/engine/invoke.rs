// Timed invocation boundary.
//
// The wrapped value lives on its own OS thread. Each call is shipped to that
// thread as a job and the caller waits at most `budget` for the reply. A call
// that overruns is abandoned: the worker keeps running it, its reply channel is
// gone, and the result is dropped when it finally arrives. Until the worker
// reports the abandoned generation as complete, further calls are refused
// instead of queued, so at most one call is ever in flight.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

/// How a single call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    Completed(R),
    /// The call panicked; carries the panic message.
    Faulted(String),
    TimedOut,
    /// An earlier abandoned call is still running, nothing was issued.
    Busy,
}

#[derive(Debug, Clone)]
pub struct Invocation<R> {
    pub outcome: Outcome<R>,
    pub elapsed: Duration,
    pub generation: u64,
}

pub struct TimedInvoker<T: ?Sized + Send + 'static> {
    jobs: Option<mpsc::Sender<(u64, Job<T>)>>,
    worker: Option<JoinHandle<()>>,
    /// Generation of the last call handed to the worker.
    issued: u64,
    /// Generation of the last call the worker finished, updated by the worker.
    completed: Arc<AtomicU64>,
    label: String,
}

impl<T: ?Sized + Send + 'static> TimedInvoker<T> {
    /// Move `target` onto a dedicated worker thread.
    pub fn spawn(label: &str, target: Box<T>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<(u64, Job<T>)>();
        let worker = thread::Builder::new()
            .name(format!("controller-{label}"))
            .spawn(move || {
                let mut target = target;
                while let Ok((_generation, job)) = rx.recv() {
                    job(&mut *target);
                }
            })?;
        Ok(TimedInvoker {
            jobs: Some(tx),
            worker: Some(worker),
            issued: 0,
            completed: Arc::new(AtomicU64::new(0)),
            label: label.to_string(),
        })
    }

    /// Whether an abandoned call is still running on the worker.
    pub fn is_busy(&self) -> bool {
        self.completed.load(Ordering::Acquire) < self.issued
    }

    /// Run `f` on the worker and wait at most `budget` for it.
    pub fn invoke<R, F>(&mut self, budget: Duration, f: F) -> Invocation<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let start = Instant::now();
        if self.is_busy() {
            return Invocation {
                outcome: Outcome::Busy,
                elapsed: start.elapsed(),
                generation: self.issued,
            };
        }

        self.issued += 1;
        let generation = self.issued;
        let completed = Arc::clone(&self.completed);
        let (reply_tx, reply_rx) = mpsc::sync_channel::<Result<R, String>>(1);

        let job: Job<T> = Box::new(move |target: &mut T| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(target)));
            // Mark completion before replying so the caller never sees a
            // finished call as still busy.
            completed.store(generation, Ordering::Release);
            // The receiver is gone if the caller already gave up; the late
            // result is discarded here.
            let _ = reply_tx.send(result.map_err(panic_message));
        });

        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send((generation, job)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.completed.store(generation, Ordering::Release);
            return Invocation {
                outcome: Outcome::Faulted("controller worker has exited".to_string()),
                elapsed: start.elapsed(),
                generation,
            };
        }

        let outcome = match reply_rx.recv_timeout(budget) {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(message)) => {
                tracing::error!(worker = %self.label, generation, "Controller panicked: {message}");
                Outcome::Faulted(message)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!(worker = %self.label, generation, ?budget, "Abandoning call after timeout");
                Outcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                Outcome::Faulted("controller worker exited mid-call".to_string())
            }
        };

        Invocation {
            outcome,
            elapsed: start.elapsed(),
            generation,
        }
    }
}

impl<T: ?Sized + Send + 'static> Drop for TimedInvoker<T> {
    fn drop(&mut self) {
        // Closing the job channel lets an idle worker exit.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if self.is_busy() {
                tracing::debug!(worker = %self.label, "Detaching worker stuck in abandoned call");
            } else {
                let _ = worker.join();
            }
        }
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    fn counter() -> TimedInvoker<Counter> {
        TimedInvoker::spawn("test", Box::new(Counter { value: 0 })).unwrap()
    }

    #[test]
    fn test_completed_call() {
        let mut invoker = counter();
        let result = invoker.invoke(Duration::from_secs(1), |c| {
            c.value += 1;
            c.value
        });
        assert_eq!(result.outcome, Outcome::Completed(1));
        assert_eq!(result.generation, 1);
        assert!(!invoker.is_busy());
    }

    #[test]
    fn test_state_persists_between_calls() {
        let mut invoker = counter();
        for _ in 0..5 {
            invoker.invoke(Duration::from_secs(1), |c| c.value += 2);
        }
        let result = invoker.invoke(Duration::from_secs(1), |c| c.value);
        assert_eq!(result.outcome, Outcome::Completed(10));
    }

    #[test]
    fn test_panic_is_captured() {
        let mut invoker = counter();
        let result: Invocation<()> =
            invoker.invoke(Duration::from_secs(1), |_| panic!("controller exploded"));
        assert_eq!(
            result.outcome,
            Outcome::Faulted("controller exploded".to_string())
        );
        // The worker survives a panic.
        let result = invoker.invoke(Duration::from_secs(1), |c| c.value);
        assert_eq!(result.outcome, Outcome::Completed(0));
    }

    #[test]
    fn test_timeout_returns_at_budget() {
        let mut invoker = counter();
        let result = invoker.invoke(Duration::from_millis(50), |c| {
            std::thread::sleep(Duration::from_millis(300));
            c.value = 99;
        });
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(result.elapsed >= Duration::from_millis(50));
        assert!(
            result.elapsed < Duration::from_millis(250),
            "elapsed {:?}",
            result.elapsed
        );
    }

    #[test]
    fn test_busy_until_abandoned_call_finishes() {
        let mut invoker = counter();
        let result = invoker.invoke(Duration::from_millis(20), |c| {
            std::thread::sleep(Duration::from_millis(150));
            c.value = 7;
        });
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(invoker.is_busy());

        let refused = invoker.invoke(Duration::from_secs(1), |c| c.value);
        assert_eq!(refused.outcome, Outcome::Busy);

        std::thread::sleep(Duration::from_millis(300));
        assert!(!invoker.is_busy());
        // The abandoned call ran to completion on the worker; only its reply
        // was discarded.
        let result = invoker.invoke(Duration::from_secs(1), |c| c.value);
        assert_eq!(result.outcome, Outcome::Completed(7));
    }

    #[test]
    fn test_panic_message_kinds() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}
