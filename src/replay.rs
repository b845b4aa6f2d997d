// Replay recording: collects event records and compresses them for storage.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::engine::config::MatchConfig;
use crate::engine::error::ReplayError;
use crate::engine::event::EventRecord;
use crate::engine::state::MatchState;

/// A persisted match: its configuration plus the full event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    pub config: MatchConfig,
    pub records: Vec<EventRecord>,
}

impl Replay {
    /// State after applying the first `prefix` records. A prefix longer than
    /// the log replays everything.
    pub fn rebuild(&self, prefix: usize) -> Result<MatchState, ReplayError> {
        let end = prefix.min(self.records.len());
        MatchState::replay(self.config.clone(), &self.records[..end])
    }

    pub fn final_state(&self) -> Result<MatchState, ReplayError> {
        self.rebuild(self.records.len())
    }

    /// Gzipped JSON encoding.
    pub fn encode(&self) -> Result<Vec<u8>, ReplayError> {
        let json = serde_json::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }
}

/// Collects event records during a match and compresses them on finish.
pub struct ReplayRecorder {
    replay: Replay,
}

impl ReplayRecorder {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            replay: Replay {
                config,
                records: Vec::new(),
            },
        }
    }

    pub fn record(&mut self, record: EventRecord) {
        self.replay.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.replay.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replay.records.is_empty()
    }

    pub fn finish(self) -> Result<Vec<u8>, ReplayError> {
        self.replay.encode()
    }
}

/// Decompress and decode gzipped replay data.
pub fn decompress_replay(data: &[u8]) -> Result<Replay, ReplayError> {
    let mut decoder = GzDecoder::new(data);
    let mut json = String::new();
    decoder.read_to_string(&mut json)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::GameMode;
    use crate::engine::event::Event;

    fn joined(seq: u64, player: u32) -> EventRecord {
        EventRecord::new(
            seq,
            Event::PlayerJoined {
                player,
                name: format!("P{player}"),
                team: None,
            },
        )
    }

    #[test]
    fn test_record_and_decompress() {
        let mut recorder = ReplayRecorder::new(MatchConfig::default());
        recorder.record(joined(0, 1));
        recorder.record(joined(1, 2));
        recorder.record(EventRecord::new(
            2,
            Event::MatchBegin {
                mode: GameMode::FreeForAll,
                rounds: 1,
            },
        ));
        assert_eq!(recorder.len(), 3);

        let compressed = recorder.finish().unwrap();
        assert!(!compressed.is_empty());

        let replay = decompress_replay(&compressed).unwrap();
        assert_eq!(replay.records.len(), 3);
        assert_eq!(replay.records[2].tag, "match_begin");
        assert_eq!(replay.config, MatchConfig::default());
    }

    #[test]
    fn test_rebuild_prefix() {
        let mut recorder = ReplayRecorder::new(MatchConfig::default());
        recorder.record(joined(0, 1));
        recorder.record(joined(1, 2));
        let replay = decompress_replay(&recorder.finish().unwrap()).unwrap();

        assert!(replay.rebuild(0).unwrap().players.is_empty());
        assert_eq!(replay.rebuild(1).unwrap().players.len(), 1);
        assert_eq!(replay.rebuild(99).unwrap().players.len(), 2);
    }

    #[test]
    fn test_empty_recorder() {
        let recorder = ReplayRecorder::new(MatchConfig::default());
        assert!(recorder.is_empty());
        let replay = decompress_replay(&recorder.finish().unwrap()).unwrap();
        assert!(replay.records.is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            decompress_replay(b"not gzip at all"),
            Err(ReplayError::Io(_))
        ));
    }

    #[test]
    fn test_out_of_order_log_rejected() {
        let replay = Replay {
            config: MatchConfig::default(),
            records: vec![joined(0, 1), joined(2, 2)],
        };
        assert!(matches!(
            replay.final_state(),
            Err(ReplayError::OutOfOrder {
                expected: 1,
                found: 2
            })
        ));
    }
}
