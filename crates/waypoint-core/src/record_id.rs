use crate::clock::{Clock, SystemClock};
use jiff::Timestamp;
use modular_bitfield::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use typed_builder::TypedBuilder;

const MAX_ELAPSED_SECONDS: u64 = (1_u64 << 34) - 1;
const MAX_NODE: u8 = 0b11;
const MAX_SEQUENCE: u16 = (1 << 12) - 1;

/// Opaque unique identifier of a [`LinkRecord`](crate::record::LinkRecord).
///
/// Packed flake-style id: ids are assigned once at creation and never
/// reused, because the (timestamp, sequence, node) triple marches forward
/// monotonically.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// 34 bits of seconds since a custom epoch.
    pub seconds: B34,
    /// 12 bits of per-second sequence (up to 4096 ids per second per node).
    pub sequence: B12,
    /// 2 bits of node index (allows up to 4 nodes).
    pub node: B2,
}

impl RecordId {
    /// Returns the id packed into a `u64` (fits in 48 bits, so it also
    /// round-trips losslessly through an `i64` database column).
    pub fn as_u64(self) -> u64 {
        let raw = self.into_bytes();
        let mut wide = [0u8; 8];
        wide[..6].copy_from_slice(&raw);
        u64::from_le_bytes(wide)
    }

    /// Reconstructs an id from its packed `u64` form.
    pub fn from_u64(value: u64) -> Self {
        let wide = value.to_le_bytes();
        let mut raw = [0u8; 6];
        raw.copy_from_slice(&wide[..6]);
        Self::from_bytes(raw)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordId")
            .field("seconds", &self.seconds())
            .field("sequence", &self.sequence())
            .field("node", &self.node())
            .finish()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_u64().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        Ok(Self::from_u64(value))
    }
}

#[derive(Debug, Clone, Error)]
pub enum RecordIdError {
    #[error("node index {node} exceeds the maximum of {max}")]
    InvalidNode { node: u8, max: u8 },
    #[error("start epoch {epoch} is ahead of the current time {now}")]
    EpochAhead { epoch: Timestamp, now: Timestamp },
    #[error("elapsed time no longer fits in the 34-bit timestamp field")]
    OverTimeLimit,
    #[error("id generator state lock was poisoned")]
    StatePoisoned,
}

/// Configures a [`RecordIdGenerator`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct RecordIdSettings {
    /// A unique node index in the range `[0, 3]`.
    #[builder]
    pub node: u8,
    /// Custom epoch used as the zero point for the timestamp field.
    ///
    /// Id math runs at whole-second precision; sub-second detail is
    /// intentionally not modeled.
    #[builder]
    pub start_epoch: Timestamp,
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: Option<Timestamp>,
    sequence: u16,
}

/// Record id generator with Sonyflake-style wait-on-overflow semantics.
pub struct RecordIdGenerator<C: Clock> {
    start_epoch: Timestamp,
    node: u8,
    clock: C,
    state: Mutex<GeneratorState>,
}

impl RecordIdGenerator<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(settings: RecordIdSettings) -> Result<Self, RecordIdError> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> RecordIdGenerator<C> {
    pub fn with_clock(settings: RecordIdSettings, clock: C) -> Result<Self, RecordIdError> {
        if settings.node > MAX_NODE {
            return Err(RecordIdError::InvalidNode {
                node: settings.node,
                max: MAX_NODE,
            });
        }

        let now = clock.now();
        if settings.start_epoch > now {
            return Err(RecordIdError::EpochAhead {
                epoch: settings.start_epoch,
                now,
            });
        }

        Ok(Self {
            start_epoch: settings.start_epoch,
            node: settings.node,
            clock,
            state: Mutex::new(GeneratorState::default()),
        })
    }

    /// Generates the next unique id.
    ///
    /// If the per-second sequence is exhausted, waits for the next second.
    /// If the clock moves backward, waits until it has caught up; otherwise
    /// two calls could produce the same (timestamp, sequence, node) triple.
    pub fn next_id(&self) -> Result<RecordId, RecordIdError> {
        let mut state = self.state.lock().map_err(|_| RecordIdError::StatePoisoned)?;

        let mut now = self.clock.now();

        match state.last_timestamp {
            None => {
                state.sequence = 0;
            }
            Some(last) => {
                if now < last {
                    self.clock.wait_until(last);
                    now = self.clock.now();
                }

                if now.as_second() == last.as_second() {
                    if state.sequence < MAX_SEQUENCE {
                        state.sequence += 1;
                    } else {
                        let next_second = Timestamp::from_second(last.as_second() + 1)
                            .expect("next second is a valid timestamp");
                        self.clock.wait_until(next_second);
                        now = self.clock.now();
                        state.sequence = 0;
                    }
                } else {
                    state.sequence = 0;
                }
            }
        }

        let elapsed = now.as_second() - self.start_epoch.as_second();
        if elapsed as u64 > MAX_ELAPSED_SECONDS {
            return Err(RecordIdError::OverTimeLimit);
        }

        let id = RecordId::new()
            .with_seconds(elapsed as u64)
            .with_sequence(state.sequence)
            .with_node(self.node);

        state.last_timestamp = Some(now);

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use jiff::SignedDuration;

    fn make_generator(node: u8, clock_second: i64) -> (RecordIdGenerator<ManualClock>, ManualClock) {
        let settings = RecordIdSettings::builder()
            .node(node)
            .start_epoch(Timestamp::from_second(0).unwrap())
            .build();
        let clock = ManualClock::at_second(clock_second);
        let generator = RecordIdGenerator::with_clock(settings, clock.clone()).unwrap();
        (generator, clock)
    }

    #[test]
    fn first_id_has_sequence_zero() {
        let (generator, _) = make_generator(0, 100);
        let id = generator.next_id().unwrap();
        assert_eq!(id.sequence(), 0);
        assert_eq!(id.seconds(), 100);
    }

    #[test]
    fn same_second_increments_sequence() {
        let (generator, _) = make_generator(0, 100);
        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();
        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_ne!(first.as_u64(), second.as_u64());
    }

    #[test]
    fn new_second_resets_sequence() {
        let (generator, clock) = make_generator(0, 100);
        generator.next_id().unwrap();
        generator.next_id().unwrap();

        clock.advance(SignedDuration::from_secs(1));
        let id = generator.next_id().unwrap();
        assert_eq!(id.sequence(), 0);
        assert_eq!(id.seconds(), 101);
    }

    #[test]
    fn sequence_overflow_waits_for_next_second() {
        let (generator, _) = make_generator(0, 100);
        for _ in 0..=MAX_SEQUENCE {
            generator.next_id().unwrap();
        }
        // The manual clock's wait_until jumps forward, so this does not hang.
        let id = generator.next_id().unwrap();
        assert_eq!(id.seconds(), 101);
        assert_eq!(id.sequence(), 0);
    }

    #[test]
    fn rejects_out_of_range_node() {
        let settings = RecordIdSettings::builder()
            .node(4)
            .start_epoch(Timestamp::from_second(0).unwrap())
            .build();
        let Err(err) = RecordIdGenerator::new(settings) else {
            panic!("node 4 must be rejected");
        };
        assert!(matches!(err, RecordIdError::InvalidNode { .. }));
    }

    #[test]
    fn u64_round_trip() {
        let id = RecordId::new()
            .with_seconds(123_456_789)
            .with_sequence(42)
            .with_node(3);
        let packed = id.as_u64();
        let back = RecordId::from_u64(packed);
        assert_eq!(back, id);
        assert_eq!(back.sequence(), 42);
        assert_eq!(back.node(), 3);
    }

    #[test]
    fn serde_round_trips_as_u64() {
        let id = RecordId::new().with_seconds(99).with_sequence(7).with_node(1);
        let json = serde_json::to_string(&id).unwrap();
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
