//! In-memory storage primitives: epochs and the segment stores they own.
//!
//! An [`Epoch`] covers one `epoch_duration`-aligned interval and is split into
//! a fixed number of [`SegmentStore`]s, each holding `segment_length`
//! fixed-size sample slots spaced `resolution` apart.

pub mod epoch;
pub mod segment;

pub use epoch::{Epoch, EpochLayout, EpochState};
pub use segment::SegmentStore;

/// Timestamp in nanoseconds.
pub type Timestamp = i64;

/// Half-open time interval `[start_ts, start_ts + duration)` covered by an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpochSpan {
    /// Start timestamp (inclusive), aligned to the epoch duration.
    pub start_ts: Timestamp,
    /// Duration of the span in nanoseconds.
    pub duration: i64,
}

impl EpochSpan {
    /// Creates a span starting at `start_ts`.
    pub fn new(start_ts: Timestamp, duration: i64) -> Self {
        Self { start_ts, duration }
    }

    /// Returns the span that contains `timestamp`.
    ///
    /// Returns `None` if that span would start below `i64::MIN`.
    pub fn containing(timestamp: Timestamp, duration: i64) -> Option<Self> {
        align_timestamp(timestamp, duration).map(|start_ts| Self::new(start_ts, duration))
    }

    /// End timestamp (exclusive).
    ///
    /// Saturates at `i64::MAX` for the topmost span, whose real end is not
    /// representable; use [`EpochSpan::contains`] for membership.
    pub fn end_ts(&self) -> Timestamp {
        self.start_ts.saturating_add(self.duration)
    }

    /// Returns true if `timestamp` falls within the span.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start_ts && timestamp.abs_diff(self.start_ts) < self.duration as u64
    }

    /// Returns true if the span overlaps `[start, end)`.
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start_ts < end && self.end_ts() > start
    }
}

/// Aligns a timestamp down to a multiple of `step`, flooring for negatives.
///
/// Returns `None` when the aligned value is below `i64::MIN`.
pub(crate) fn align_timestamp(timestamp: Timestamp, step: i64) -> Option<Timestamp> {
    let (quotient, _) = div_floor(timestamp, step);
    quotient.checked_mul(step)
}

/// Rounds a timestamp up to the next multiple of `step`.
pub(crate) fn align_timestamp_up(timestamp: Timestamp, step: i64) -> Timestamp {
    let (quotient, remainder) = div_floor(timestamp, step);
    if remainder == 0 {
        timestamp
    } else {
        (quotient + 1).saturating_mul(step)
    }
}

fn div_floor(value: i64, divisor: i64) -> (i64, i64) {
    let mut quotient = value / divisor;
    let mut remainder = value % divisor;
    if remainder < 0 {
        quotient -= 1;
        remainder += divisor;
    }
    (quotient, remainder)
}
