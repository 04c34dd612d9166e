//! Epoch lifecycle: creation, sealing and eviction under the epoch caps.

pub mod ring;

pub use ring::{EpochRing, RingCaps, RingStats, Transition};
