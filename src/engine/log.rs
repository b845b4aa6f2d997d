// Append-only event log. Owns the live match state: every append applies the
// event first, stores it, then publishes it to subscribers.

use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use tokio::sync::broadcast;

use super::config::{MatchConfig, EVENT_CHANNEL_CAPACITY};
use super::event::{Event, EventRecord};
use super::state::MatchState;

pub struct EventLog {
    state: MatchState,
    records: Arc<RwLock<Vec<EventRecord>>>,
    sender: broadcast::Sender<EventRecord>,
    /// Thread that performed the first append. Only it may append afterwards.
    owner: Option<ThreadId>,
}

impl EventLog {
    pub fn new(config: MatchConfig) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventLog {
            state: MatchState::new(config),
            records: Arc::new(RwLock::new(Vec::new())),
            sender,
            owner: None,
        }
    }

    /// Apply `event` to the match state and record it.
    ///
    /// # Panics
    ///
    /// Panics when called from a different thread than the first append, or
    /// when the event cannot be applied to the current state. Both mean the
    /// round engine itself is broken.
    pub fn append(&mut self, event: Event) -> EventRecord {
        let current = thread::current().id();
        match self.owner {
            None => self.owner = Some(current),
            Some(owner) if owner != current => {
                tracing::error!(?owner, ?current, "Event log appended from foreign thread");
                panic!("event log mutated from {current:?}, owned by {owner:?}");
            }
            Some(_) => {}
        }

        let record = EventRecord::new(self.state.next_sequence, event);
        if let Err(e) = self.state.apply(&record) {
            tracing::error!(sequence = record.sequence, tag = %record.tag, "Event log corrupted: {e}");
            panic!("event log corrupted at sequence {}: {e}", record.sequence);
        }

        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());

        // No receivers is fine; lagging receivers drop old records on their own.
        let _ = self.sender.send(record.clone());
        record
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.reader().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record appended so far.
    pub fn records(&self) -> Vec<EventRecord> {
        self.reader().since(0)
    }

    /// Read handle that can be moved to observer threads.
    pub fn reader(&self) -> EventLogReader {
        EventLogReader {
            records: Arc::clone(&self.records),
        }
    }

    /// Stream of records published after this call. A receiver that falls
    /// more than the channel capacity behind skips the oldest records.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }
}

/// Shared read-only view of an event log. Readers must expect more records
/// to arrive after any read.
#[derive(Clone)]
pub struct EventLogReader {
    records: Arc<RwLock<Vec<EventRecord>>>,
}

impl EventLogReader {
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records with `sequence >= cursor`.
    pub fn since(&self, cursor: u64) -> Vec<EventRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let start = (cursor as usize).min(records.len());
        records[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(player: u32) -> Event {
        Event::PlayerJoined {
            player,
            name: format!("P{player}"),
            team: None,
        }
    }

    #[test]
    fn test_append_assigns_contiguous_sequence() {
        let mut log = EventLog::new(MatchConfig::default());
        assert!(log.is_empty());
        let a = log.append(joined(1));
        let b = log.append(joined(2));
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.state().players.len(), 2);
        assert_eq!(log.state().next_sequence, 2);
    }

    #[test]
    fn test_reader_cursor() {
        let mut log = EventLog::new(MatchConfig::default());
        let reader = log.reader();
        log.append(joined(1));
        assert_eq!(reader.since(0).len(), 1);
        log.append(joined(2));
        log.append(joined(3));
        let tail = reader.since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 1);
        assert!(reader.since(10).is_empty());
    }

    #[test]
    fn test_subscriber_sees_applied_records() {
        let mut log = EventLog::new(MatchConfig::default());
        let mut rx = log.subscribe();
        log.append(joined(1));
        let record = rx.try_recv().unwrap();
        assert_eq!(record.tag, "player_joined");
        assert_eq!(record.players, vec![1]);
    }

    #[test]
    fn test_replay_matches_live_state() {
        let mut log = EventLog::new(MatchConfig::default());
        log.append(joined(1));
        log.append(joined(2));
        let replayed =
            MatchState::replay(MatchConfig::default(), log.records().iter()).unwrap();
        assert_eq!(&replayed, log.state());
    }

    #[test]
    #[should_panic(expected = "event log corrupted")]
    fn test_inconsistent_event_is_fatal() {
        let mut log = EventLog::new(MatchConfig::default());
        log.append(joined(1));
        log.append(joined(1));
    }

    #[test]
    fn test_foreign_thread_append_is_fatal() {
        let mut log = EventLog::new(MatchConfig::default());
        log.append(joined(1));
        let result = std::thread::spawn(move || {
            log.append(joined(2));
        })
        .join();
        assert!(result.is_err());
    }
}
