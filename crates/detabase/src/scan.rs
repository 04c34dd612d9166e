//! Lazy, time-ordered range reads.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::store::{Epoch, Timestamp};

/// Iterator over the samples stored in `[start, end)`, in timestamp order.
///
/// Epoch membership is snapshotted when the scan is created; slot contents are
/// copied one segment at a time as the iterator advances. An epoch evicted
/// after the snapshot stays readable through this scan, and an epoch evicted
/// before it is simply absent. Absent slots are skipped.
///
/// Scans are not rewindable; issue a new read to start over.
#[derive(Debug)]
pub struct Scan {
    epochs: VecDeque<Arc<Epoch>>,
    start: Timestamp,
    end: Timestamp,
    resolution: i64,
    /// Epoch being scanned and the next segment index within it.
    cursor: Option<(Arc<Epoch>, usize)>,
    buffered: std::vec::IntoIter<(Timestamp, Vec<u8>)>,
}

impl Scan {
    pub(crate) fn new(
        epochs: Vec<Arc<Epoch>>,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
    ) -> Self {
        Self {
            epochs: epochs.into(),
            start,
            end,
            resolution,
            cursor: None,
            buffered: Vec::new().into_iter(),
        }
    }

    /// Slot offsets of `epoch` that fall inside the scan range.
    ///
    /// Computed in `i128` so spans touching either end of the `i64` range
    /// cannot overflow.
    fn offset_range(&self, epoch: &Epoch) -> (usize, usize) {
        let span = epoch.span();
        let slots = (span.duration / self.resolution) as usize;
        let resolution = i128::from(self.resolution);
        // First slot at or after `ts`, clamped to the epoch.
        let ceil_offset = |ts: Timestamp| -> usize {
            let delta = i128::from(ts) - i128::from(span.start_ts);
            (delta + resolution - 1)
                .div_euclid(resolution)
                .clamp(0, slots as i128) as usize
        };
        (ceil_offset(self.start), ceil_offset(self.end))
    }

    /// Loads the next non-empty segment into the buffer.
    ///
    /// Returns false once every epoch has been exhausted.
    fn fill(&mut self) -> bool {
        loop {
            let (epoch, segment_index) = match self.cursor.take() {
                Some(cursor) => cursor,
                None => match self.epochs.pop_front() {
                    Some(epoch) => (epoch, 0),
                    None => return false,
                },
            };

            let Some(segment) = epoch.segments().get(segment_index) else {
                continue;
            };
            let (first, last) = self.offset_range(&epoch);
            let seg_start = segment.start_offset();
            let seg_end = seg_start + segment.capacity();

            if seg_start >= last {
                // Remaining segments of this epoch are past the range.
                continue;
            }
            self.cursor = Some((Arc::clone(&epoch), segment_index + 1));
            if seg_end <= first {
                continue;
            }

            let from = first.max(seg_start) - seg_start;
            let to = last.min(seg_end) - seg_start;
            let samples: Vec<_> = segment
                .read_present(from..to)
                .into_iter()
                .map(|(slot, payload)| (epoch.timestamp_of(seg_start + slot), payload))
                .collect();

            if !samples.is_empty() {
                self.buffered = samples.into_iter();
                return true;
            }
        }
    }
}

impl Iterator for Scan {
    type Item = (Timestamp, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sample) = self.buffered.next() {
                return Some(sample);
            }
            if !self.fill() {
                return None;
            }
        }
    }
}
