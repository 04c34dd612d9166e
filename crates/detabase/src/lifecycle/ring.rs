//! Epoch ring: routes timestamps to epochs and enforces the epoch caps.
//!
//! The ring owns every tracked [`Epoch`] in a map ordered by start timestamp.
//! It creates epochs on demand as ingestion advances, seals the oldest open
//! epoch when more than `max_rw_epochs` are open, and evicts the oldest sealed
//! epoch when more than `max_ro_epochs` are sealed.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_detabase::lifecycle::{EpochRing, RingCaps};
//!
//! let ring = EpochRing::new(layout, RingCaps::new(10, 2));
//! let epoch = ring.resolve_for_write(ts)?;
//! epoch.write_at(ts, &payload)?;
//! ```
//!
//! # Locking
//!
//! Ring membership sits behind one `RwLock`. Resolving a timestamp whose
//! epoch already exists needs only the shared lock; creating, sealing and
//! evicting epochs happen under the exclusive lock, so readers see the ring
//! either before or after a whole cascade.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::descriptor::validate_rw_cap;
use crate::error::{DetabaseError, Result};
use crate::store::{align_timestamp_up, Epoch, EpochLayout, EpochSpan, EpochState, Timestamp};

/// Caps on the number of open and sealed epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCaps {
    /// Maximum retained sealed epochs.
    pub max_ro_epochs: usize,
    /// Maximum concurrently open epochs (at least 1).
    pub max_rw_epochs: usize,
}

impl RingCaps {
    /// Creates a cap pair.
    pub fn new(max_ro_epochs: usize, max_rw_epochs: usize) -> Self {
        Self {
            max_ro_epochs,
            max_rw_epochs,
        }
    }
}

/// Statistics for an epoch ring.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RingStats {
    /// Number of open epochs.
    pub open_epochs: usize,
    /// Number of sealed epochs.
    pub sealed_epochs: usize,
    /// Samples stored across all tracked epochs.
    pub sample_count: usize,
    /// Start timestamp of the oldest tracked epoch.
    pub oldest_epoch_ts: Option<Timestamp>,
    /// Start timestamp of the newest tracked epoch.
    pub newest_epoch_ts: Option<Timestamp>,
    /// Writes to epochs starting below this mark are rejected.
    ///
    /// An evicted epoch newer than some tracked epoch is held back as a gap
    /// and only folds into the mark once every older epoch has been evicted.
    pub low_water_mark: Option<Timestamp>,
    /// Evicted epochs still above the oldest tracked epoch.
    pub evicted_gaps: usize,
    /// Total number of epochs evicted since creation.
    pub evicted_epochs: u64,
}

/// Outcome of a cap enforcement pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Start timestamps of epochs sealed by this pass.
    pub sealed: Vec<Timestamp>,
    /// Start timestamps of epochs evicted by this pass.
    pub evicted: Vec<Timestamp>,
}

#[derive(Debug)]
struct RingState {
    /// Tracked epochs (start_ts -> epoch).
    epochs: BTreeMap<Timestamp, Arc<Epoch>>,
    caps: RingCaps,
    /// End of the newest evicted epoch older than every tracked epoch.
    low_water_mark: Option<Timestamp>,
    /// Evicted epochs (start_ts -> end_ts) newer than some tracked epoch.
    evicted_gaps: BTreeMap<Timestamp, Timestamp>,
    evicted_epochs: u64,
}

impl RingState {
    fn count(&self, state: EpochState) -> usize {
        self.epochs
            .values()
            .filter(|epoch| epoch.state() == state)
            .count()
    }

    fn oldest_with(&self, state: EpochState) -> Option<Timestamp> {
        self.epochs
            .iter()
            .find(|(_, epoch)| epoch.state() == state)
            .map(|(&start_ts, _)| start_ts)
    }

    /// Seals the oldest open epochs past the rw cap, then evicts the oldest
    /// sealed epochs past the ro cap.
    fn enforce_caps(&mut self) -> Transition {
        let mut transition = Transition::default();

        while self.count(EpochState::Open) > self.caps.max_rw_epochs {
            let Some(start_ts) = self.oldest_with(EpochState::Open) else {
                break;
            };
            if let Some(epoch) = self.epochs.get(&start_ts) {
                epoch.seal();
                debug!("Sealed epoch {} (open cap {})", start_ts, self.caps.max_rw_epochs);
                transition.sealed.push(start_ts);
            }
        }

        self.evict_sealed(&mut transition);
        transition
    }

    fn evict_sealed(&mut self, transition: &mut Transition) {
        while self.count(EpochState::Sealed) > self.caps.max_ro_epochs {
            let Some(start_ts) = self.oldest_with(EpochState::Sealed) else {
                break;
            };
            if let Some(epoch) = self.epochs.remove(&start_ts) {
                self.evicted_gaps.insert(start_ts, epoch.span().end_ts());
                self.fold_gaps();
                self.evicted_epochs += 1;
                info!(
                    "Evicted epoch {} with {} samples (sealed cap {})",
                    start_ts,
                    epoch.sample_count(),
                    self.caps.max_ro_epochs
                );
                transition.evicted.push(start_ts);
            }
        }
    }

    /// Moves gaps no longer above a tracked epoch into the low-water mark.
    fn fold_gaps(&mut self) {
        let oldest = self.epochs.keys().next().copied();
        while let Some((&start_ts, &end_ts)) = self.evicted_gaps.first_key_value() {
            if oldest.is_some_and(|oldest| start_ts > oldest) {
                break;
            }
            self.evicted_gaps.remove(&start_ts);
            self.low_water_mark = Some(self.low_water_mark.map_or(end_ts, |lwm| lwm.max(end_ts)));
        }
    }
}

/// Ordered, capacity-bounded collection of epochs.
#[derive(Debug)]
pub struct EpochRing {
    layout: EpochLayout,
    state: RwLock<RingState>,
}

impl EpochRing {
    /// Creates an empty ring.
    pub fn new(layout: EpochLayout, caps: RingCaps) -> Self {
        Self {
            layout,
            state: RwLock::new(RingState {
                epochs: BTreeMap::new(),
                caps,
                low_water_mark: None,
                evicted_gaps: BTreeMap::new(),
                evicted_epochs: 0,
            }),
        }
    }

    /// Returns the epoch geometry.
    pub fn layout(&self) -> &EpochLayout {
        &self.layout
    }

    /// Returns the current caps.
    pub fn caps(&self) -> RingCaps {
        self.state.read().caps
    }

    /// Calculates the epoch start timestamp for a given timestamp.
    ///
    /// Returns `None` if the epoch would start below `i64::MIN`.
    pub fn epoch_start_ts(&self, timestamp: Timestamp) -> Option<Timestamp> {
        EpochSpan::containing(timestamp, self.layout.epoch_duration).map(|span| span.start_ts)
    }

    /// Resolves the open epoch that should receive a write at `timestamp`,
    /// creating it if needed.
    ///
    /// Creating an epoch may seal the oldest open epoch and evict the oldest
    /// sealed one; the whole cascade runs under the exclusive ring lock.
    ///
    /// # Errors
    ///
    /// - `EpochSealed` if the epoch exists and is sealed.
    /// - `EpochTooOld` if the epoch is missing and older than the retained
    ///   window, was evicted, would be sealed as soon as it was created, or
    ///   starts below `i64::MIN`.
    pub fn resolve_for_write(&self, timestamp: Timestamp) -> Result<Arc<Epoch>> {
        let Some(start_ts) = self.epoch_start_ts(timestamp) else {
            return Err(DetabaseError::EpochTooOld {
                timestamp,
                oldest: align_timestamp_up(Timestamp::MIN, self.layout.epoch_duration),
            });
        };

        {
            let state = self.state.read();
            if let Some(epoch) = state.epochs.get(&start_ts) {
                return Self::writable(epoch);
            }
        }

        let mut state = self.state.write();
        // Another writer may have created it while the lock was released.
        if let Some(epoch) = state.epochs.get(&start_ts) {
            return Self::writable(epoch);
        }

        if let Some(low_water_mark) = state.low_water_mark {
            if start_ts < low_water_mark {
                return Err(DetabaseError::EpochTooOld {
                    timestamp,
                    oldest: low_water_mark,
                });
            }
        }
        if let Some(&end_ts) = state.evicted_gaps.get(&start_ts) {
            return Err(DetabaseError::EpochTooOld {
                timestamp,
                oldest: end_ts,
            });
        }
        if let Some((&oldest, _)) = state.epochs.first_key_value() {
            if start_ts < oldest {
                return Err(DetabaseError::EpochTooOld { timestamp, oldest });
            }
        }
        // A gap epoch older than every open epoch would be sealed on arrival.
        if state.count(EpochState::Open) >= state.caps.max_rw_epochs {
            if let Some(oldest_open) = state.oldest_with(EpochState::Open) {
                if start_ts < oldest_open {
                    return Err(DetabaseError::EpochTooOld {
                        timestamp,
                        oldest: oldest_open,
                    });
                }
            }
        }

        let epoch = Arc::new(Epoch::new(start_ts, self.layout));
        state.epochs.insert(start_ts, Arc::clone(&epoch));
        debug!("Created epoch {}", start_ts);

        state.enforce_caps();
        Ok(epoch)
    }

    /// Returns the tracked epoch whose span contains `timestamp`.
    pub fn resolve_for_read(&self, timestamp: Timestamp) -> Option<Arc<Epoch>> {
        let start_ts = self.epoch_start_ts(timestamp)?;
        self.state.read().epochs.get(&start_ts).cloned()
    }

    /// Snapshots the tracked epochs overlapping `[start, end)`, oldest first.
    pub fn overlapping(&self, start: Timestamp, end: Timestamp) -> Vec<Arc<Epoch>> {
        if end <= start {
            return Vec::new();
        }
        // No epoch can start below the first representable one.
        let first = self.epoch_start_ts(start).unwrap_or(Timestamp::MIN);
        self.state
            .read()
            .epochs
            .range(first..end)
            .map(|(_, epoch)| Arc::clone(epoch))
            .collect()
    }

    /// Seals the epoch containing `timestamp` and evicts past the sealed cap.
    ///
    /// Returns `None` if no such epoch is tracked, otherwise whether this call
    /// sealed it (false if it was already sealed).
    pub fn seal_at(&self, timestamp: Timestamp) -> Option<bool> {
        let start_ts = self.epoch_start_ts(timestamp)?;
        let mut state = self.state.write();
        let sealed = state.epochs.get(&start_ts)?.seal();
        if sealed {
            debug!("Sealed epoch {} on request", start_ts);
        }
        let mut transition = Transition::default();
        state.evict_sealed(&mut transition);
        Some(sealed)
    }

    /// Replaces the caps and enforces them immediately.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` if `max_rw_epochs` is zero.
    pub fn set_caps(&self, caps: RingCaps) -> Result<Transition> {
        validate_rw_cap(caps.max_rw_epochs)?;
        let mut state = self.state.write();
        state.caps = caps;
        Ok(state.enforce_caps())
    }

    /// Returns start timestamps and states of all tracked epochs, oldest first.
    pub fn epochs(&self) -> Vec<(Timestamp, EpochState)> {
        self.state
            .read()
            .epochs
            .iter()
            .map(|(&start_ts, epoch)| (start_ts, epoch.state()))
            .collect()
    }

    /// Returns statistics for the ring.
    pub fn stats(&self) -> RingStats {
        let state = self.state.read();
        let mut stats = RingStats {
            oldest_epoch_ts: state.epochs.keys().next().copied(),
            newest_epoch_ts: state.epochs.keys().next_back().copied(),
            low_water_mark: state.low_water_mark,
            evicted_gaps: state.evicted_gaps.len(),
            evicted_epochs: state.evicted_epochs,
            ..RingStats::default()
        };

        for epoch in state.epochs.values() {
            match epoch.state() {
                EpochState::Open => stats.open_epochs += 1,
                EpochState::Sealed => stats.sealed_epochs += 1,
            }
            stats.sample_count += epoch.sample_count();
        }
        stats
    }

    fn writable(epoch: &Arc<Epoch>) -> Result<Arc<Epoch>> {
        if epoch.is_sealed() {
            return Err(DetabaseError::EpochSealed {
                start: epoch.start_ts(),
            });
        }
        Ok(Arc::clone(epoch))
    }
}
