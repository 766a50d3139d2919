//! Partition Set
//!
//! Owns every partition of a data directory and coordinates their lifecycle.
//!
//! ## Responsibilities
//! - Discover existing partitions on startup
//! - Allocate strictly increasing partition ids
//! - Hand out new partitions and register them once closed
//! - Search partitions newest → oldest for reads
//! - Iterate all partitions, loading closed ones on demand

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use crate::config::IndexPersistence;
use crate::error::{ReconError, Result};

use super::partition::{self, FileRole, Partition, PartitionId, PartitionStorage};

/// Registry of loaded and known-but-unloaded partitions
///
/// An id lives in at most one of the two collections.
pub(crate) struct SetState {
    /// Loaded partitions with a live file handle
    pub(crate) opened: BTreeMap<PartitionId, Partition>,
    /// Partitions present on disk but not loaded
    pub(crate) available: BTreeSet<PartitionId>,
}

impl SetState {
    /// Every known id, oldest first
    pub(crate) fn ids_oldest_first(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self
            .opened
            .keys()
            .chain(self.available.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.opened.len() + self.available.len()
    }
}

/// Manages the partitions of one data directory
///
/// ## Concurrency:
/// - `state`: one Mutex; every traversal holds it for its whole duration,
///   so no partition is closed or deleted while it is being read
/// - `last_id`: atomic high-water mark for id allocation
pub struct PartitionSet {
    /// Directory where partition files are stored
    dir: PathBuf,

    /// Index persistence strategy for newly created partitions
    persistence: IndexPersistence,

    state: Mutex<SetState>,

    /// Largest id handed out or discovered so far
    last_id: AtomicU64,
}

impl PartitionSet {
    /// Open or create the partition set in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove leftover temp index files
    /// 3. Register every complete log + index pair as available
    /// 4. Continue id allocation above the largest id found
    pub fn open(dir: &Path, persistence: IndexPersistence) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut logs = BTreeSet::new();
        let mut indexes = BTreeSet::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if partition::is_tmp_index(name) {
                tracing::debug!(file = %path.display(), "removing stale temp index");
                fs::remove_file(&path)?;
                continue;
            }

            match partition::parse_file_name(name) {
                Some((id, FileRole::Log)) => {
                    logs.insert(id);
                }
                Some((id, FileRole::Index)) => {
                    indexes.insert(id);
                }
                None => {}
            }
        }

        for orphan in logs.symmetric_difference(&indexes) {
            tracing::warn!(id = orphan, "skipping partition with a missing log or index file");
        }

        let available: BTreeSet<PartitionId> = logs.intersection(&indexes).copied().collect();
        let last_id = logs.iter().chain(indexes.iter()).copied().max().unwrap_or(0);

        tracing::info!(
            dir = %dir.display(),
            partitions = available.len(),
            "opened partition set"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            persistence,
            state: Mutex::new(SetState {
                opened: BTreeMap::new(),
                available,
            }),
            last_id: AtomicU64::new(last_id),
        })
    }

    /// Allocate a fresh, writable partition
    ///
    /// The partition belongs to the caller until it is handed back through
    /// [`close_partition`](Self::close_partition) or
    /// [`discard_partition`](Self::discard_partition); until then it is not
    /// visible to reads, iteration or merge.
    pub fn create_partition(&self) -> Result<Partition> {
        let id = self.next_id()?;
        Partition::create(&self.dir, id, self.persistence)
    }

    /// Like `create_partition`, but the index is only written on flush/close
    pub(crate) fn create_bulk_partition(&self) -> Result<Partition> {
        let id = self.next_id()?;
        Partition::create(&self.dir, id, IndexPersistence::OnClose)
    }

    /// Close a pending partition and register its id as available
    ///
    /// A partition that fails to close is deleted, so nothing partial is
    /// left behind.
    pub fn close_partition(&self, p: Partition) -> Result<()> {
        let id = p.created_at();
        let mut state = self.state.lock();

        if let Err(e) = p.close() {
            if let Err(cleanup) = Partition::remove_files(&self.dir, id) {
                tracing::warn!(id, error = %cleanup, "failed to remove unfinished partition");
            }
            return Err(e);
        }

        state.available.insert(id);
        Ok(())
    }

    /// Close a loaded partition and move its id back to available
    pub fn close_opened(&self, id: PartitionId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(p) = state.opened.remove(&id) else {
            return Err(ReconError::UnknownPartition(id));
        };
        state.available.insert(id);
        p.close()
    }

    /// Delete a pending partition that will never be registered
    pub fn discard_partition(&self, p: Partition) -> Result<()> {
        p.discard()
    }

    /// Load an available partition and keep it resident
    pub fn open_partition(&self, id: PartitionId) -> Result<()> {
        let mut state = self.state.lock();
        if state.opened.contains_key(&id) {
            return Ok(());
        }
        if !state.available.contains(&id) {
            return Err(ReconError::UnknownPartition(id));
        }

        let p = Partition::open(&self.dir, id)?;
        state.available.remove(&id);
        state.opened.insert(id, p);
        Ok(())
    }

    /// Ids of partitions on disk that are not currently loaded
    pub fn get_available_partitions(&self) -> BTreeSet<PartitionId> {
        self.state.lock().available.clone()
    }

    /// Look a key up across all partitions, newest first
    ///
    /// The newest partition that indexes the key decides the answer.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let mut ids = state.ids_oldest_first();
        ids.reverse();

        for id in ids {
            match self.with_partition(&mut state, id, |p| p.get(key)) {
                Ok(value) => return Ok(value),
                Err(ReconError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ReconError::KeyNotFound)
    }

    /// Visit opened partitions, then available ones (loaded transiently)
    ///
    /// The callback returns `false` to stop early.
    pub fn range<F>(&self, mut cb: F) -> Result<()>
    where
        F: FnMut(PartitionId, &mut dyn PartitionStorage) -> bool,
    {
        let mut state = self.state.lock();
        let ids: Vec<PartitionId> = state
            .opened
            .keys()
            .chain(state.available.iter())
            .copied()
            .collect();

        self.visit(&mut state, ids, |id, p| Ok(cb(id, p)))
    }

    /// Close every opened partition and mark it available
    pub fn close_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        let opened = std::mem::take(&mut state.opened);
        let mut first_err = None;

        for (id, p) in opened {
            if let Err(e) = p.close() {
                tracing::warn!(id, error = %e, "failed to close partition");
                first_err.get_or_insert(e);
            }
            state.available.insert(id);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Total number of partitions (opened + available)
    pub fn partition_count(&self) -> usize {
        self.state.lock().len()
    }

    /// Number of partitions currently loaded
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Get the data directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Crate-internal Helpers
    // =========================================================================

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SetState> {
        self.state.lock()
    }

    /// Run `f` against partition `id`, loading it from disk if it isn't opened
    pub(crate) fn with_partition<T, F>(&self, state: &mut SetState, id: PartitionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn PartitionStorage) -> Result<T>,
    {
        if let Some(p) = state.opened.get_mut(&id) {
            return f(p);
        }
        let mut p = Partition::open(&self.dir, id)?;
        f(&mut p)
    }

    /// Visit the given ids in order; `f` returns `Ok(false)` to stop
    pub(crate) fn visit<F>(&self, state: &mut SetState, ids: Vec<PartitionId>, mut f: F) -> Result<()>
    where
        F: FnMut(PartitionId, &mut dyn PartitionStorage) -> Result<bool>,
    {
        for id in ids {
            if !self.with_partition(state, id, |p| f(id, p))? {
                break;
            }
        }
        Ok(())
    }

    /// Strictly increasing, time-based id
    ///
    /// Fails once the largest id seen is `u64::MAX`.
    fn next_id(&self) -> Result<PartitionId> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        match self.last_id.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            last.checked_add(1).map(|next| now.max(next))
        }) {
            Ok(prev) => Ok(now.max(prev + 1)),
            Err(last) => Err(ReconError::IdsExhausted(last)),
        }
    }
}
