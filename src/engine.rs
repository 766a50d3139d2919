//! Engine Module
//!
//! The storage engine that coordinates the memtable and the partition set.
//!
//! ## Responsibilities
//! - Route reads through memtable, then partitions (newest → oldest)
//! - Serialize every operation behind one engine-wide lock
//! - Trigger syncs when the memtable is full (if configured)
//! - Expose on-demand compaction

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{ReconError, Result};
use crate::memtable::MemTable;
use crate::storage::{MergeStats, PartitionSet};

/// The main storage engine
///
/// ## Concurrency Model: whole-engine mutual exclusion
///
/// Every public operation (get/set/del/sync/merge) holds `lock` for its
/// whole duration. A merge therefore always sees a consistent snapshot of
/// partitions, and no read observes a half-drained memtable. The guard is
/// scoped, so it is released on every exit path including `?` returns.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// On-disk partitions (internal Mutex on the registry)
    partitions: Arc<PartitionSet>,

    /// Serializes all operations
    lock: Mutex<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Open/create data directory
    /// 3. Discover existing partitions
    /// 4. Start with an empty memtable
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let partitions = Arc::new(PartitionSet::open(
            &config.data_dir,
            config.index_persistence,
        )?);
        let memtable = MemTable::new(Arc::clone(&partitions));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            partitions = partitions.partition_count(),
            "engine opened"
        );

        Ok(Self {
            config,
            memtable,
            partitions,
            lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes; a tombstone here is final)
    /// 2. Partitions (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let _guard = self.lock.lock();

        match self.memtable.get(key) {
            Err(ReconError::KeyNotFound) => self.partitions.get(key),
            other => other,
        }
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.lock.lock();

        let new_size = self.memtable.set(key, value);
        self.maybe_sync(new_size)
    }

    /// Delete a key
    ///
    /// A key only present on disk gets a tombstone in the memtable. Fails
    /// with `KeyNotFound` if the key has no live value anywhere, whether it
    /// was never written or is already removed.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.lock();

        // A pending tombstone is as removed as a synced one
        if let Err(ReconError::KeyRemoved) = self.memtable.get(key) {
            return Err(ReconError::KeyNotFound);
        }

        let new_size = match self.memtable.del(key) {
            Ok(size) => size,
            Err(ReconError::KeyNotFound) => match self.partitions.get(key) {
                Ok(_) => self.memtable.tombstone(key),
                Err(ReconError::KeyRemoved) => return Err(ReconError::KeyNotFound),
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };

        self.maybe_sync(new_size)
    }

    /// Flush the memtable into a new partition
    pub fn sync(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.memtable.sync().map(|_| ())
    }

    /// Merge all partitions into one
    pub fn merge_sort(&self) -> Result<MergeStats> {
        let _guard = self.lock.lock();
        self.partitions.merge_sort()
    }

    /// Close the engine gracefully
    ///
    /// Syncs pending memtable entries and closes every opened partition.
    pub fn close(self) -> Result<()> {
        let _guard = self.lock.lock();

        self.memtable.sync()?;
        self.partitions.close_all()?;

        tracing::info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    /// Sync when the configured memtable limit is reached
    fn maybe_sync(&self, memtable_size: usize) -> Result<()> {
        match self.config.memtable_size_limit {
            Some(limit) if memtable_size >= limit => {
                tracing::debug!(size = memtable_size, limit, "memtable limit reached");
                self.memtable.sync().map(|_| ())
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the memtable entry count
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the number of partitions (opened + available)
    pub fn partition_count(&self) -> usize {
        self.partitions.partition_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
