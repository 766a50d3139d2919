//! MemTable implementation
//!
//! HashMap-based memtable with RwLock for concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ReconError, Result};
use crate::storage::{Entry, Partition, PartitionId, PartitionSet, PartitionStorage};

struct Inner {
    entries: HashMap<Vec<u8>, Entry>,
    /// Approximate bytes held (keys + values)
    size: usize,
}

impl Inner {
    /// Insert and return the new approximate size
    fn insert(&mut self, key: Vec<u8>, entry: Entry) -> usize {
        let key_len = key.len();
        let new_len = entry.payload_len();
        match self.entries.insert(key, entry) {
            Some(old) => self.size = self.size - old.payload_len() + new_len,
            None => self.size += key_len + new_len,
        }
        self.size
    }
}

/// In-memory table for recent writes
pub struct MemTable {
    inner: RwLock<Inner>,
    /// Destination for `sync`
    partitions: Arc<PartitionSet>,
}

impl MemTable {
    /// Create a new empty MemTable that flushes into `partitions`
    pub fn new(partitions: Arc<PartitionSet>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                size: 0,
            }),
            partitions,
        }
    }

    /// Get a value by key (read lock)
    ///
    /// Only the memtable is consulted; flushed data is not visible here.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.inner.read().entries.get(key) {
            Some(Entry::Value(v)) => Ok(v.clone()),
            Some(Entry::Tombstone) => Err(ReconError::KeyRemoved),
            None => Err(ReconError::KeyNotFound),
        }
    }

    /// Insert or overwrite a key; returns the new approximate size
    pub fn set(&self, key: &[u8], value: &[u8]) -> usize {
        self.inner
            .write()
            .insert(key.to_vec(), Entry::Value(value.to_vec()))
    }

    /// Replace a present key's value with a tombstone
    ///
    /// Fails with `KeyNotFound` if the memtable has never seen the key.
    pub fn del(&self, key: &[u8]) -> Result<usize> {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(key) {
            return Err(ReconError::KeyNotFound);
        }
        Ok(inner.insert(key.to_vec(), Entry::Tombstone))
    }

    /// Record a tombstone for a key that may only exist on disk
    pub(crate) fn tombstone(&self, key: &[u8]) -> usize {
        self.inner.write().insert(key.to_vec(), Entry::Tombstone)
    }

    /// Flush every entry into a new partition and empty the memtable
    ///
    /// Holds the write lock throughout, so no reader sees a half-drained
    /// table. Entries are only removed once the partition is closed and
    /// registered; on failure the partition is discarded and every entry
    /// stays. Returns the new partition's id, or `None` if there was nothing
    /// to flush.
    pub fn sync(&self) -> Result<Option<PartitionId>> {
        let mut inner = self.inner.write();
        if inner.entries.is_empty() {
            return Ok(None);
        }

        let mut partition = self.partitions.create_partition()?;
        let id = partition.created_at();

        if let Err(e) = write_entries(&mut partition, &inner.entries) {
            if let Err(cleanup) = self.partitions.discard_partition(partition) {
                tracing::warn!(id, error = %cleanup, "failed to discard partial partition");
            }
            return Err(e);
        }

        self.partitions.close_partition(partition)?;

        tracing::info!(id, entries = inner.entries.len(), bytes = inner.size, "memtable synced");
        inner.entries.clear();
        inner.size = 0;
        Ok(Some(id))
    }

    /// Number of entries (tombstones included)
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().size
    }
}

fn write_entries(partition: &mut Partition, entries: &HashMap<Vec<u8>, Entry>) -> Result<()> {
    for (key, entry) in entries {
        match entry {
            Entry::Value(v) => partition.set(key, v)?,
            Entry::Tombstone => partition.del(key)?,
        }
    }
    Ok(())
}
