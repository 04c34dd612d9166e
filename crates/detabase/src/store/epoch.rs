//! A time-bounded collection of segment stores with an Open/Sealed state.

use parking_lot::RwLock;

use crate::error::{DetabaseError, Result};
use crate::store::{EpochSpan, SegmentStore, Timestamp};

/// Mutability state of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    /// Accepts writes.
    Open,
    /// Read-only. Never transitions back to `Open`.
    Sealed,
}

/// Geometry shared by every epoch of one Detabase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochLayout {
    /// Nanoseconds between consecutive slots.
    pub resolution: i64,
    /// Nanoseconds covered by one epoch.
    pub epoch_duration: i64,
    /// Slots per segment.
    pub segment_length: usize,
    /// Segments per epoch.
    pub segments_per_epoch: usize,
    /// Bytes per sample.
    pub payload_size: usize,
}

impl EpochLayout {
    /// Total slots in one epoch.
    pub fn slots_per_epoch(&self) -> usize {
        self.segment_length * self.segments_per_epoch
    }
}

/// One `epoch_duration`-aligned interval of storage.
///
/// The state lock is held shared for the whole of a slot write and exclusive
/// by [`Epoch::seal`], so once `seal` returns no further write can land.
#[derive(Debug)]
pub struct Epoch {
    span: EpochSpan,
    layout: EpochLayout,
    state: RwLock<EpochState>,
    segments: Vec<SegmentStore>,
}

impl Epoch {
    /// Creates an open epoch starting at `start_ts`.
    pub fn new(start_ts: Timestamp, layout: EpochLayout) -> Self {
        let segments = (0..layout.segments_per_epoch)
            .map(|index| {
                SegmentStore::new(
                    index * layout.segment_length,
                    layout.segment_length,
                    layout.payload_size,
                )
            })
            .collect();

        Self {
            span: EpochSpan::new(start_ts, layout.epoch_duration),
            layout,
            state: RwLock::new(EpochState::Open),
            segments,
        }
    }

    /// Returns the interval covered by this epoch.
    pub fn span(&self) -> EpochSpan {
        self.span
    }

    /// Start timestamp (inclusive).
    pub fn start_ts(&self) -> Timestamp {
        self.span.start_ts
    }

    /// Current state.
    pub fn state(&self) -> EpochState {
        *self.state.read()
    }

    /// Returns true if the epoch rejects writes.
    pub fn is_sealed(&self) -> bool {
        self.state() == EpochState::Sealed
    }

    /// Returns the segment stores in offset order.
    pub fn segments(&self) -> &[SegmentStore] {
        &self.segments
    }

    /// Converts a timestamp inside this epoch to a slot offset.
    ///
    /// Returns `None` if the timestamp is outside the span.
    pub fn offset_of(&self, timestamp: Timestamp) -> Option<usize> {
        if !self.span.contains(timestamp) {
            return None;
        }
        let delta = timestamp.abs_diff(self.span.start_ts);
        Some((delta / self.layout.resolution as u64) as usize)
    }

    /// Converts a slot offset back to its timestamp.
    pub fn timestamp_of(&self, offset: usize) -> Timestamp {
        self.span.start_ts + offset as i64 * self.layout.resolution
    }

    /// Writes `payload` at the given slot offset within the epoch.
    ///
    /// # Errors
    ///
    /// Returns `EpochSealed` if the epoch is sealed, and `SlotOutOfRange` if the
    /// offset is past the last slot of the epoch.
    pub fn write_slot(&self, offset: usize, payload: &[u8]) -> Result<()> {
        let state = self.state.read();
        if *state == EpochState::Sealed {
            return Err(DetabaseError::EpochSealed {
                start: self.span.start_ts,
            });
        }

        let (segment, slot) = self.locate(offset)?;
        segment.write(slot, payload)
    }

    /// Writes `payload` at the slot holding `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `EpochMismatch` if `timestamp` is outside this epoch, otherwise
    /// the errors of [`Epoch::write_slot`].
    pub fn write_at(&self, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        let offset = self
            .offset_of(timestamp)
            .ok_or(DetabaseError::EpochMismatch {
                timestamp,
                start: self.span.start_ts,
            })?;
        self.write_slot(offset, payload)
    }

    /// Reads the payload at the given slot offset.
    pub fn read_slot(&self, offset: usize) -> Result<Option<Vec<u8>>> {
        let (segment, slot) = self.locate(offset)?;
        segment.read(slot)
    }

    /// Transitions the epoch to `Sealed`.
    ///
    /// Returns true if this call performed the transition; sealing an already
    /// sealed epoch is a no-op.
    pub fn seal(&self) -> bool {
        let mut state = self.state.write();
        if *state == EpochState::Sealed {
            return false;
        }
        *state = EpochState::Sealed;
        true
    }

    /// Number of samples stored across all segments.
    pub fn sample_count(&self) -> usize {
        self.segments.iter().map(SegmentStore::len).sum()
    }

    fn locate(&self, offset: usize) -> Result<(&SegmentStore, usize)> {
        let index = offset / self.layout.segment_length;
        match self.segments.get(index) {
            Some(segment) => Ok((segment, offset % self.layout.segment_length)),
            None => Err(DetabaseError::SlotOutOfRange {
                slot: offset,
                length: self.layout.slots_per_epoch(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> EpochLayout {
        EpochLayout {
            resolution: 10,
            epoch_duration: 120,
            segment_length: 4,
            segments_per_epoch: 3,
            payload_size: 2,
        }
    }

    #[test]
    fn test_new_epoch_is_open_with_segments() {
        let epoch = Epoch::new(240, layout());
        assert_eq!(epoch.state(), EpochState::Open);
        assert_eq!(epoch.segments().len(), 3);
        assert_eq!(epoch.segments()[2].start_offset(), 8);
        assert_eq!(epoch.span().end_ts(), 360);
    }

    #[test]
    fn test_write_slot_routes_to_segment() {
        let epoch = Epoch::new(0, layout());
        epoch.write_slot(5, &[5, 5]).unwrap();

        assert_eq!(epoch.segments()[1].read(1).unwrap(), Some(vec![5, 5]));
        assert_eq!(epoch.read_slot(5).unwrap(), Some(vec![5, 5]));
        assert_eq!(epoch.sample_count(), 1);
    }

    #[test]
    fn test_write_slot_past_epoch_end() {
        let epoch = Epoch::new(0, layout());
        let err = epoch.write_slot(12, &[0, 0]).unwrap_err();
        assert!(matches!(
            err,
            DetabaseError::SlotOutOfRange {
                slot: 12,
                length: 12
            }
        ));
    }

    #[test]
    fn test_sealed_epoch_rejects_writes() {
        let epoch = Epoch::new(120, layout());
        epoch.write_slot(0, &[1, 1]).unwrap();

        assert!(epoch.seal());
        let err = epoch.write_slot(0, &[2, 2]).unwrap_err();
        assert!(matches!(err, DetabaseError::EpochSealed { start: 120 }));
        assert_eq!(epoch.read_slot(0).unwrap(), Some(vec![1, 1]));
    }

    #[test]
    fn test_seal_is_idempotent() {
        let epoch = Epoch::new(0, layout());
        assert!(epoch.seal());
        assert!(!epoch.seal());
        assert!(epoch.is_sealed());
    }

    #[test]
    fn test_offset_and_timestamp_conversion() {
        let epoch = Epoch::new(120, layout());
        assert_eq!(epoch.offset_of(120), Some(0));
        assert_eq!(epoch.offset_of(230), Some(11));
        assert_eq!(epoch.offset_of(240), None);
        assert_eq!(epoch.offset_of(119), None);
        assert_eq!(epoch.timestamp_of(11), 230);
    }

    #[test]
    fn test_write_at_outside_epoch() {
        let epoch = Epoch::new(120, layout());
        epoch.write_at(230, &[3, 3]).unwrap();
        assert_eq!(epoch.read_slot(11).unwrap(), Some(vec![3, 3]));

        let err = epoch.write_at(240, &[4, 4]).unwrap_err();
        assert!(matches!(
            err,
            DetabaseError::EpochMismatch {
                timestamp: 240,
                start: 120
            }
        ));
        assert_eq!(epoch.sample_count(), 1);
    }

    #[test]
    fn test_topmost_epoch_reaches_i64_max() {
        let layout = EpochLayout {
            resolution: 1,
            epoch_duration: 10,
            segment_length: 5,
            segments_per_epoch: 2,
            payload_size: 1,
        };
        let start = i64::MAX - 7;
        let epoch = Epoch::new(start, layout);

        assert_eq!(epoch.offset_of(i64::MAX), Some(7));
        epoch.write_at(i64::MAX, &[9]).unwrap();
        assert_eq!(epoch.read_slot(7).unwrap(), Some(vec![9]));
        assert_eq!(epoch.timestamp_of(7), i64::MAX);
    }
}
