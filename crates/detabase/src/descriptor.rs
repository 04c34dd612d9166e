//! Creation descriptor and its validation.
//!
//! A [`CreationDescriptor`] is supplied once when a Detabase is created and
//! never changes afterwards (apart from the epoch caps, which `edit` may
//! replace). Validation derives the [`EpochLayout`] that every epoch of the
//! instance shares.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_detabase::CreationDescriptor;
//!
//! let descriptor = CreationDescriptor::new("metrics", 60_000_000_000, 3_600_000_000_000, 16, 60)
//!     .with_max_ro_epochs(24)
//!     .with_max_rw_epochs(2);
//! let layout = descriptor.validate()?;
//! assert_eq!(layout.segments_per_epoch, 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DetabaseError, Result};
use crate::store::EpochLayout;

/// Default number of retained sealed epochs.
pub const DEFAULT_MAX_RO_EPOCHS: usize = 10;

/// Default number of concurrently writable epochs.
pub const DEFAULT_MAX_RW_EPOCHS: usize = 2;

/// Structural parameters of a Detabase.
///
/// Field names serialize in camelCase (`epochDuration`, `maxROEpochs`, ...)
/// so bootstrap files use the same vocabulary as creation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationDescriptor {
    /// Unique instance name.
    pub name: String,
    /// Nanoseconds between consecutive sample slots.
    pub resolution: i64,
    /// Nanoseconds covered by one epoch.
    pub epoch_duration: i64,
    /// Bytes per sample.
    pub payload_size: usize,
    /// Samples per segment store.
    pub segment_length: usize,
    /// Maximum retained sealed epochs.
    #[serde(rename = "maxROEpochs", default = "default_max_ro_epochs")]
    pub max_ro_epochs: usize,
    /// Maximum concurrently open epochs.
    #[serde(rename = "maxRWEpochs", default = "default_max_rw_epochs")]
    pub max_rw_epochs: usize,
}

fn default_max_ro_epochs() -> usize {
    DEFAULT_MAX_RO_EPOCHS
}

fn default_max_rw_epochs() -> usize {
    DEFAULT_MAX_RW_EPOCHS
}

impl CreationDescriptor {
    /// Creates a descriptor with default epoch caps.
    pub fn new(
        name: impl Into<String>,
        resolution: i64,
        epoch_duration: i64,
        payload_size: usize,
        segment_length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            resolution,
            epoch_duration,
            payload_size,
            segment_length,
            max_ro_epochs: DEFAULT_MAX_RO_EPOCHS,
            max_rw_epochs: DEFAULT_MAX_RW_EPOCHS,
        }
    }

    /// Sets the sealed-epoch cap.
    pub fn with_max_ro_epochs(mut self, max: usize) -> Self {
        self.max_ro_epochs = max;
        self
    }

    /// Sets the open-epoch cap.
    pub fn with_max_rw_epochs(mut self, max: usize) -> Self {
        self.max_rw_epochs = max;
        self
    }

    /// Validates every field and derives the epoch layout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` naming the first violated field. The
    /// epoch/segment invariant `epochDuration = n × segmentLength × resolution`
    /// is reported against `segmentLength`.
    pub fn validate(&self) -> Result<EpochLayout> {
        if self.name.trim().is_empty() {
            return Err(DetabaseError::invalid("name", "must not be empty"));
        }
        if self.resolution <= 0 {
            return Err(DetabaseError::invalid(
                "resolution",
                format!("must be positive, got {}", self.resolution),
            ));
        }
        if self.epoch_duration <= 0 {
            return Err(DetabaseError::invalid(
                "epochDuration",
                format!("must be positive, got {}", self.epoch_duration),
            ));
        }
        if self.epoch_duration % self.resolution != 0 {
            return Err(DetabaseError::invalid(
                "epochDuration",
                format!(
                    "{} is not a multiple of resolution {}",
                    self.epoch_duration, self.resolution
                ),
            ));
        }
        if self.payload_size == 0 {
            return Err(DetabaseError::invalid("payloadSize", "must be positive"));
        }
        if self.segment_length == 0 {
            return Err(DetabaseError::invalid("segmentLength", "must be positive"));
        }
        validate_rw_cap(self.max_rw_epochs)?;

        let slots = (self.epoch_duration / self.resolution) as u64;
        let segment_length = self.segment_length as u64;
        if slots < segment_length || slots % segment_length != 0 {
            return Err(DetabaseError::invalid(
                "segmentLength",
                format!(
                    "epochDuration {} holds {} slots at resolution {}, \
                     which is not a whole number of {}-slot segments",
                    self.epoch_duration, slots, self.resolution, self.segment_length
                ),
            ));
        }

        Ok(EpochLayout {
            resolution: self.resolution,
            epoch_duration: self.epoch_duration,
            segment_length: self.segment_length,
            segments_per_epoch: (slots / segment_length) as usize,
            payload_size: self.payload_size,
        })
    }
}

/// Validates the open-epoch cap. Any sealed-epoch cap, including zero, is valid.
pub(crate) fn validate_rw_cap(max_rw_epochs: usize) -> Result<()> {
    if max_rw_epochs == 0 {
        return Err(DetabaseError::invalid("maxRWEpochs", "must be at least 1"));
    }
    Ok(())
}
