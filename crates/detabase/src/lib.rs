//! Detabase - Alopex epoch-segmented time series storage engine
//!
//! This crate provides a fixed-resolution time series store that keeps a
//! rolling window of epochs. Each Detabase is configured once by a
//! [`CreationDescriptor`] and from then on manages its own epochs.
//!
//! # Components
//!
//! - [`SegmentStore`]: fixed-capacity array of fixed-size sample slots
//! - [`Epoch`]: one `epoch_duration`-aligned interval of segment stores, Open or Sealed
//! - [`EpochRing`]: epoch routing with `maxRWEpochs` / `maxROEpochs` caps
//! - [`Registry`]: process-wide named instances (create / ingest / read / drop)
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_detabase::{CreationDescriptor, Registry};
//!
//! const MINUTE: i64 = 60_000_000_000;
//!
//! let registry = Registry::new();
//! registry.create(
//!     CreationDescriptor::new("cpu", MINUTE, 60 * MINUTE, 16, 30)
//!         .with_max_ro_epochs(10)
//!         .with_max_rw_epochs(2),
//! )?;
//!
//! registry.ingest("cpu", 0, &[0u8; 16])?;
//! registry.ingest("cpu", MINUTE, &[1u8; 16])?;
//!
//! let samples: Vec<_> = registry.read("cpu", 0, 2 * MINUTE)?.collect();
//! assert_eq!(samples.len(), 2);
//! ```

#![deny(missing_docs)]

pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod scan;
pub mod store;

pub use descriptor::CreationDescriptor;
pub use error::{DetabaseError, Result};
pub use lifecycle::{EpochRing, RingCaps, RingStats};
pub use registry::{Detabase, DetabaseInfo, Registry};
pub use scan::Scan;
pub use store::{Epoch, EpochLayout, EpochSpan, EpochState, SegmentStore, Timestamp};
