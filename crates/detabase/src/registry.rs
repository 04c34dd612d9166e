//! Detabase controller and the process-wide registry of named instances.
//!
//! [`Registry`] maps instance names to [`Detabase`]s. Its lock is taken
//! exclusively only to register or remove an instance; ingestion and reads
//! clone the instance handle under the shared lock and release it before
//! touching the epoch ring.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_detabase::{CreationDescriptor, Registry};
//!
//! let registry = Registry::new();
//! registry.create(CreationDescriptor::new("cpu", 60_000_000_000, 3_600_000_000_000, 16, 60))?;
//! registry.ingest("cpu", 0, &[0u8; 16])?;
//! for (ts, payload) in registry.read("cpu", 0, 3_600_000_000_000)? {
//!     println!("{ts}: {payload:?}");
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::descriptor::CreationDescriptor;
use crate::error::{DetabaseError, Result};
use crate::lifecycle::{EpochRing, RingCaps, RingStats};
use crate::scan::Scan;
use crate::store::{EpochLayout, Timestamp};

/// Summary of one registered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetabaseInfo {
    /// Descriptor with the caps currently in force.
    pub descriptor: CreationDescriptor,
    /// Segment stores per epoch.
    pub segments_per_epoch: usize,
}

/// A named time series store built from a validated descriptor.
#[derive(Debug)]
pub struct Detabase {
    descriptor: CreationDescriptor,
    ring: EpochRing,
}

impl Detabase {
    /// Validates `descriptor` and builds an empty instance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` naming the violated field.
    pub fn new(descriptor: CreationDescriptor) -> Result<Self> {
        let layout = descriptor.validate()?;
        let caps = RingCaps::new(descriptor.max_ro_epochs, descriptor.max_rw_epochs);
        Ok(Self {
            ring: EpochRing::new(layout, caps),
            descriptor,
        })
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Epoch geometry derived from the descriptor.
    pub fn layout(&self) -> &EpochLayout {
        self.ring.layout()
    }

    /// The epoch ring backing this instance.
    pub fn ring(&self) -> &EpochRing {
        &self.ring
    }

    /// Stores one sample.
    ///
    /// # Errors
    ///
    /// - `BadPayloadSize` if the payload length differs from `payloadSize`.
    /// - `Misaligned` if `timestamp` is not a multiple of the resolution.
    /// - `EpochSealed` / `EpochTooOld` from epoch resolution, including
    ///   timestamps whose epoch would start below `i64::MIN`.
    pub fn ingest(&self, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        self.check_sample(timestamp, payload)?;
        self.write(timestamp, payload)
    }

    /// Stores a batch of samples in order.
    ///
    /// Every sample is checked for size and alignment before any is written.
    /// A ring error stops the batch; samples before it stay written.
    pub fn ingest_batch(&self, samples: &[(Timestamp, Vec<u8>)]) -> Result<()> {
        for (timestamp, payload) in samples {
            self.check_sample(*timestamp, payload)?;
        }
        for (timestamp, payload) in samples {
            self.write(*timestamp, payload)?;
        }
        Ok(())
    }

    /// Returns a lazy scan over the samples in `[start, end)`.
    ///
    /// Evicted or never-written ranges produce no samples.
    pub fn read(&self, start: Timestamp, end: Timestamp) -> Scan {
        let epochs = self.ring.overlapping(start, end);
        Scan::new(epochs, start, end, self.layout().resolution)
    }

    /// Seals the epoch containing `timestamp`.
    ///
    /// Returns true if an epoch was tracked there (sealing is idempotent).
    pub fn seal(&self, timestamp: Timestamp) -> bool {
        self.ring.seal_at(timestamp).is_some()
    }

    /// Replaces the epoch caps and enforces them immediately.
    pub fn edit(&self, max_ro_epochs: usize, max_rw_epochs: usize) -> Result<()> {
        let transition = self
            .ring
            .set_caps(RingCaps::new(max_ro_epochs, max_rw_epochs))?;
        info!(
            "Edited detabase {}: maxROEpochs={} maxRWEpochs={} (sealed {}, evicted {})",
            self.name(),
            max_ro_epochs,
            max_rw_epochs,
            transition.sealed.len(),
            transition.evicted.len()
        );
        Ok(())
    }

    /// Returns ring statistics.
    pub fn stats(&self) -> RingStats {
        self.ring.stats()
    }

    /// Returns the descriptor with current caps and the derived layout.
    pub fn info(&self) -> DetabaseInfo {
        let caps = self.ring.caps();
        DetabaseInfo {
            descriptor: self
                .descriptor
                .clone()
                .with_max_ro_epochs(caps.max_ro_epochs)
                .with_max_rw_epochs(caps.max_rw_epochs),
            segments_per_epoch: self.layout().segments_per_epoch,
        }
    }

    fn check_sample(&self, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        let layout = self.layout();
        if payload.len() != layout.payload_size {
            return Err(DetabaseError::BadPayloadSize {
                expected: layout.payload_size,
                actual: payload.len(),
            });
        }
        if timestamp.rem_euclid(layout.resolution) != 0 {
            return Err(DetabaseError::Misaligned {
                timestamp,
                resolution: layout.resolution,
            });
        }
        Ok(())
    }

    fn write(&self, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        self.ring.resolve_for_write(timestamp)?.write_at(timestamp, payload)
    }
}

/// Process-wide mapping from names to Detabase instances.
#[derive(Debug, Default)]
pub struct Registry {
    databases: RwLock<HashMap<String, Arc<Detabase>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry shared by the whole process.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Validates `descriptor` and registers a new instance under its name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` or `AlreadyExists`.
    pub fn create(&self, descriptor: CreationDescriptor) -> Result<()> {
        let database = Detabase::new(descriptor)?;
        let name = database.name().to_string();

        let mut databases = self.databases.write();
        if databases.contains_key(&name) {
            return Err(DetabaseError::AlreadyExists(name));
        }
        info!(
            "Created detabase {} ({} segments of {} slots per epoch)",
            name,
            database.layout().segments_per_epoch,
            database.layout().segment_length
        );
        databases.insert(name, Arc::new(database));
        Ok(())
    }

    /// Removes an instance and discards all its data.
    ///
    /// Scans already issued against the instance keep their snapshot.
    pub fn drop(&self, name: &str) -> Result<()> {
        match self.databases.write().remove(name) {
            Some(_) => {
                info!("Dropped detabase {}", name);
                Ok(())
            }
            None => Err(DetabaseError::NotFound(name.to_string())),
        }
    }

    /// Returns a handle to a registered instance.
    pub fn get(&self, name: &str) -> Result<Arc<Detabase>> {
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DetabaseError::NotFound(name.to_string()))
    }

    /// Stores one sample in the named instance.
    pub fn ingest(&self, name: &str, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        self.get(name)?.ingest(timestamp, payload)
    }

    /// Stores a batch of samples in the named instance.
    pub fn ingest_batch(&self, name: &str, samples: &[(Timestamp, Vec<u8>)]) -> Result<()> {
        self.get(name)?.ingest_batch(samples)
    }

    /// Returns a lazy scan over `[start, end)` of the named instance.
    pub fn read(&self, name: &str, start: Timestamp, end: Timestamp) -> Result<Scan> {
        Ok(self.get(name)?.read(start, end))
    }

    /// Seals the epoch containing `timestamp` in the named instance.
    pub fn seal(&self, name: &str, timestamp: Timestamp) -> Result<bool> {
        Ok(self.get(name)?.seal(timestamp))
    }

    /// Replaces the epoch caps of the named instance.
    pub fn edit(&self, name: &str, max_ro_epochs: usize, max_rw_epochs: usize) -> Result<()> {
        self.get(name)?.edit(max_ro_epochs, max_rw_epochs)
    }

    /// Returns ring statistics of the named instance.
    pub fn stats(&self, name: &str) -> Result<RingStats> {
        Ok(self.get(name)?.stats())
    }

    /// Lists every registered instance, sorted by name.
    pub fn info(&self) -> Vec<DetabaseInfo> {
        let mut infos: Vec<_> = self
            .databases
            .read()
            .values()
            .map(|database| database.info())
            .collect();
        infos.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        infos
    }

    /// Creates the instances listed in a JSON bootstrap file.
    ///
    /// The file holds an array of descriptors. A name that is already
    /// registered has its caps updated instead. Descriptors that fail are
    /// logged and skipped. Returns the number of descriptors applied.
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the file cannot be read and `BootstrapError` if it
    /// is not a descriptor array.
    pub fn bootstrap(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let descriptors: Vec<CreationDescriptor> = serde_json::from_str(&contents)
            .map_err(|err| DetabaseError::BootstrapError(format!("{}: {}", path.display(), err)))?;
        debug!(
            "Loaded {} descriptors from {}",
            descriptors.len(),
            path.display()
        );

        let mut applied = 0;
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            let (max_ro, max_rw) = (descriptor.max_ro_epochs, descriptor.max_rw_epochs);
            let result = match self.create(descriptor) {
                Err(DetabaseError::AlreadyExists(_)) => self.edit(&name, max_ro, max_rw),
                other => other,
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => warn!("Skipping bootstrap descriptor {}: {}", name, err),
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RES: i64 = 1_000;
    const EPOCH: i64 = 10 * RES;

    fn descriptor(name: &str) -> CreationDescriptor {
        CreationDescriptor::new(name, RES, EPOCH, 4, 5)
            .with_max_ro_epochs(1)
            .with_max_rw_epochs(1)
    }

    #[test]
    fn test_create_and_duplicate() {
        let registry = Registry::new();
        registry.create(descriptor("a")).unwrap();

        let err = registry.create(descriptor("a")).unwrap_err();
        assert!(matches!(err, DetabaseError::AlreadyExists(name) if name == "a"));
    }

    #[test]
    fn test_invalid_descriptor_is_not_registered() {
        let registry = Registry::new();
        let mut bad = descriptor("bad");
        bad.segment_length = 3;

        assert!(matches!(
            registry.create(bad),
            Err(DetabaseError::InvalidDescriptor {
                field: "segmentLength",
                ..
            })
        ));
        assert!(registry.info().is_empty());
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.ingest("missing", 0, &[0; 4]),
            Err(DetabaseError::NotFound(_))
        ));
        assert!(matches!(
            registry.read("missing", 0, EPOCH),
            Err(DetabaseError::NotFound(_))
        ));
        assert!(matches!(
            registry.drop("missing"),
            Err(DetabaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_ingest_validation() {
        let registry = Registry::new();
        registry.create(descriptor("v")).unwrap();

        assert!(matches!(
            registry.ingest("v", 0, &[0; 3]),
            Err(DetabaseError::BadPayloadSize {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            registry.ingest("v", RES + 1, &[0; 4]),
            Err(DetabaseError::Misaligned {
                timestamp: 1_001,
                resolution: RES
            })
        ));
        assert!(matches!(
            registry.ingest("v", -RES - 1, &[0; 4]),
            Err(DetabaseError::Misaligned { .. })
        ));
        assert_eq!(registry.stats("v").unwrap().sample_count, 0);
    }

    #[test]
    fn test_negative_aligned_timestamp() {
        let registry = Registry::new();
        registry.create(descriptor("neg")).unwrap();
        registry.ingest("neg", -RES, &[9; 4]).unwrap();

        let samples: Vec<_> = registry.read("neg", -EPOCH, 0).unwrap().collect();
        assert_eq!(samples, vec![(-RES, vec![9; 4])]);
    }

    #[test]
    fn test_batch_validates_before_writing() {
        let registry = Registry::new();
        registry.create(descriptor("b")).unwrap();

        let batch = vec![(0, vec![1; 4]), (RES, vec![2; 4]), (2 * RES, vec![3; 2])];
        assert!(matches!(
            registry.ingest_batch("b", &batch),
            Err(DetabaseError::BadPayloadSize { .. })
        ));
        assert_eq!(registry.stats("b").unwrap().sample_count, 0);

        let batch = vec![(0, vec![1; 4]), (RES, vec![2; 4])];
        registry.ingest_batch("b", &batch).unwrap();
        assert_eq!(registry.stats("b").unwrap().sample_count, 2);
    }

    #[test]
    fn test_drop_then_recreate() {
        let registry = Registry::new();
        registry.create(descriptor("d")).unwrap();
        registry.ingest("d", 0, &[1; 4]).unwrap();

        registry.drop("d").unwrap();
        registry.create(descriptor("d")).unwrap();
        assert_eq!(registry.read("d", 0, EPOCH).unwrap().count(), 0);
    }

    #[test]
    fn test_info_reports_current_caps() {
        let registry = Registry::new();
        registry.create(descriptor("z")).unwrap();
        registry.create(descriptor("a")).unwrap();
        registry.edit("z", 4, 2).unwrap();

        let infos = registry.info();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].descriptor.name, "a");
        assert_eq!(infos[1].descriptor.max_ro_epochs, 4);
        assert_eq!(infos[1].descriptor.max_rw_epochs, 2);
        assert_eq!(infos[1].segments_per_epoch, 2);
    }

    #[test]
    fn test_seal_unknown_epoch() {
        let registry = Registry::new();
        registry.create(descriptor("s")).unwrap();
        assert!(!registry.seal("s", 0).unwrap());

        registry.ingest("s", 0, &[1; 4]).unwrap();
        assert!(registry.seal("s", 0).unwrap());
        assert!(matches!(
            registry.ingest("s", RES, &[1; 4]),
            Err(DetabaseError::EpochSealed { start: 0 })
        ));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let name = "registry-global-test";
        Registry::global().create(descriptor(name)).unwrap();
        assert!(Registry::global().get(name).is_ok());
        Registry::global().drop(name).unwrap();
    }
}
