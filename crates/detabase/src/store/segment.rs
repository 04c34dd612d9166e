//! Fixed-capacity slot storage for one slice of an epoch.

use std::ops::Range;

use bitvec::prelude::*;
use parking_lot::RwLock;

use crate::error::{DetabaseError, Result};

/// Slot payloads plus a presence bitmap.
///
/// `bytes` stays empty until the first write so sparse epochs do not pay for
/// segments that never receive a sample.
#[derive(Debug)]
struct SegmentData {
    bytes: Vec<u8>,
    present: BitVec<u64, Lsb0>,
}

/// Fixed-capacity store of `length` slots, each holding either nothing or a
/// `payload_size`-byte value.
///
/// Writes are last-write-wins per slot. A segment is never partially evicted;
/// it lives exactly as long as its owning epoch.
#[derive(Debug)]
pub struct SegmentStore {
    /// Offset of slot 0 within the epoch, in slots.
    start_offset: usize,
    /// Number of slots.
    length: usize,
    /// Bytes per slot.
    payload_size: usize,
    data: RwLock<SegmentData>,
}

impl SegmentStore {
    /// Creates an empty segment.
    pub fn new(start_offset: usize, length: usize, payload_size: usize) -> Self {
        Self {
            start_offset,
            length,
            payload_size,
            data: RwLock::new(SegmentData {
                bytes: Vec::new(),
                present: bitvec![u64, Lsb0; 0; length],
            }),
        }
    }

    /// Offset of the first slot within the owning epoch.
    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// Capacity in slots.
    pub fn capacity(&self) -> usize {
        self.length
    }

    /// Number of slots currently holding a value.
    pub fn len(&self) -> usize {
        self.data.read().present.count_ones()
    }

    /// Returns true if no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.data.read().present.not_any()
    }

    /// Stores `payload` at `slot`, replacing any earlier value.
    ///
    /// # Errors
    ///
    /// Returns `SlotOutOfRange` if `slot >= capacity()` and `BadPayloadSize`
    /// if the payload length differs from the configured size.
    pub fn write(&self, slot: usize, payload: &[u8]) -> Result<()> {
        self.check_slot(slot)?;
        if payload.len() != self.payload_size {
            return Err(DetabaseError::BadPayloadSize {
                expected: self.payload_size,
                actual: payload.len(),
            });
        }

        let mut data = self.data.write();
        if data.bytes.is_empty() {
            data.bytes = vec![0; self.length * self.payload_size];
        }
        let offset = slot * self.payload_size;
        data.bytes[offset..offset + self.payload_size].copy_from_slice(payload);
        data.present.set(slot, true);
        Ok(())
    }

    /// Returns the payload stored at `slot`, or `None` if the slot is absent.
    ///
    /// # Errors
    ///
    /// Returns `SlotOutOfRange` if `slot >= capacity()`.
    pub fn read(&self, slot: usize) -> Result<Option<Vec<u8>>> {
        self.check_slot(slot)?;
        let data = self.data.read();
        if !data.present[slot] {
            return Ok(None);
        }
        let offset = slot * self.payload_size;
        Ok(Some(data.bytes[offset..offset + self.payload_size].to_vec()))
    }

    /// Copies out every present slot within `slots`, in slot order.
    ///
    /// The range is clamped to the segment capacity.
    pub fn read_present(&self, slots: Range<usize>) -> Vec<(usize, Vec<u8>)> {
        let end = slots.end.min(self.length);
        let start = slots.start.min(end);
        let data = self.data.read();

        data.present[start..end]
            .iter_ones()
            .map(|relative| {
                let slot = start + relative;
                let offset = slot * self.payload_size;
                (slot, data.bytes[offset..offset + self.payload_size].to_vec())
            })
            .collect()
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.length {
            return Err(DetabaseError::SlotOutOfRange {
                slot,
                length: self.length,
            });
        }
        Ok(())
    }
}
