//! Partition
//!
//! One on-disk segment: an append-only value log plus a key → location index.
//!
//! ## Lifecycle
//! - `create()` — fresh, writable segment (log + empty index written immediately)
//! - `set()`/`del()` — append a record, update the index
//! - `close()` — fsync the log, persist the index, release the handle
//! - `open()` — reload a closed segment read-only from its index file

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::IndexPersistence;
use crate::error::{ReconError, Result};

use super::record::{Entry, IndexEntry, IndexFile, IndexFileRef, INDEX_VERSION};

/// Partition identifier: creation time in nanoseconds since the Unix epoch
pub type PartitionId = u64;

/// Role tag of the value log file
const LOG_ROLE: &str = "partition";

/// Role tag of the index file
const INDEX_ROLE: &str = "index";

const FILE_EXT: &str = "bin";

/// The capability set shared by every partition handle
pub trait PartitionStorage {
    /// Look up a key
    ///
    /// Returns:
    /// - `Ok(value)` — key holds a live value
    /// - `Err(KeyRemoved)` — key holds a tombstone
    /// - `Err(KeyNotFound)` — key not in this partition
    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>>;

    /// Append a value and point the key at it
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Append a tombstone for the key
    fn del(&mut self, key: &[u8]) -> Result<()>;

    /// Visit every indexed key in unspecified order; the callback returns
    /// `false` to stop early
    fn range(&mut self, cb: &mut dyn FnMut(&[u8], Entry) -> bool) -> Result<()>;

    /// Creation id of this partition
    fn created_at(&self) -> PartitionId;

    /// Make everything durable and release the file handle
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A single value log + index pair
pub struct Partition {
    id: PartitionId,
    dir: PathBuf,
    log: File,
    /// Current end of the value log (next append offset)
    log_len: u64,
    index: HashMap<Vec<u8>, IndexEntry>,
    persistence: IndexPersistence,
    /// Reopened partitions are read-only
    sealed: bool,
    /// Index has changes not yet written to disk
    index_dirty: bool,
}

impl Partition {
    /// Create a new, empty, writable partition
    ///
    /// Fails if files for `id` already exist.
    pub fn create(dir: &Path, id: PartitionId, persistence: IndexPersistence) -> Result<Self> {
        let log = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(log_path(dir, id))?;

        let mut partition = Self {
            id,
            dir: dir.to_path_buf(),
            log,
            log_len: 0,
            index: HashMap::new(),
            persistence,
            sealed: false,
            index_dirty: false,
        };

        // The pair must exist on disk from the start so a restart can find it
        if let Err(e) = partition.persist_index() {
            drop(partition);
            if let Err(cleanup) = Self::remove_files(dir, id) {
                tracing::warn!(id, error = %cleanup, "failed to remove half-created partition");
            }
            return Err(e);
        }

        tracing::debug!(id, "created partition");
        Ok(partition)
    }

    /// Reopen a closed partition for reads
    ///
    /// Only the index file is decoded; no scan of the value log happens.
    pub fn open(dir: &Path, id: PartitionId) -> Result<Self> {
        let log = File::open(log_path(dir, id))?;
        let log_len = log.metadata()?.len();
        let index = load_index(&index_path(dir, id))?;

        if let Some((_, entry)) = index
            .iter()
            .find(|(_, e)| {
                e.offset
                    .checked_add(e.length as u64)
                    .map_or(true, |end| end > log_len)
            })
        {
            return Err(ReconError::Encoding(format!(
                "index of partition {} points past end of value log ({} + {} > {})",
                id, entry.offset, entry.length, log_len
            )));
        }

        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            log,
            log_len,
            index,
            persistence: IndexPersistence::OnClose,
            sealed: true,
            index_dirty: false,
        })
    }

    /// Number of keys in the index (tombstones included)
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether writes are rejected
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Sync the value log and persist the index without closing
    pub fn flush(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.log.sync_all()?;
        if self.index_dirty {
            self.persist_index()?;
        }
        Ok(())
    }

    /// Drop an unfinished partition and delete its files
    pub fn discard(self) -> Result<()> {
        let Self { id, dir, log, .. } = self;
        drop(log);
        tracing::debug!(id, "discarding partition");
        Self::remove_files(&dir, id)
    }

    /// Delete both backing files of a partition; missing files are ignored
    pub fn remove_files(dir: &Path, id: PartitionId) -> Result<()> {
        // Index first: a log without its index is never registered again
        for path in [index_path(dir, id), log_path(dir, id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn append(&mut self, key: &[u8], entry: &Entry) -> Result<()> {
        if self.sealed {
            return Err(ReconError::PartitionSealed(self.id));
        }
        #[cfg(test)]
        fault::check_append()?;

        let record = entry.encode();
        let length = u32::try_from(record.len()).map_err(|_| {
            ReconError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("value of {} bytes is too large for a record", record.len()),
            ))
        })?;

        if let Err(e) = self.log.write_all(&record) {
            // A short write leaves unreachable bytes; resync the append offset
            if let Ok(meta) = self.log.metadata() {
                self.log_len = meta.len();
            }
            return Err(e.into());
        }

        let offset = self.log_len;
        self.log_len += record.len() as u64;
        self.index.insert(key.to_vec(), IndexEntry { offset, length });

        match self.persistence {
            IndexPersistence::EveryWrite => self.persist_index(),
            IndexPersistence::OnClose => {
                self.index_dirty = true;
                Ok(())
            }
        }
    }

    fn read_entry(&mut self, location: IndexEntry) -> Result<Entry> {
        self.log.seek(SeekFrom::Start(location.offset))?;
        let mut record = vec![0u8; location.length as usize];
        self.log.read_exact(&mut record)?;

        Entry::decode(record).map_err(|reason| ReconError::Corruption {
            id: self.id,
            offset: location.offset,
            reason,
        })
    }

    /// Write the index to a temp file, fsync, then rename over the old one
    fn persist_index(&mut self) -> Result<()> {
        let path = index_path(&self.dir, self.id);
        let tmp = tmp_index_path(&self.dir, self.id);

        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(
            &mut writer,
            &IndexFileRef {
                version: INDEX_VERSION,
                entries: &self.index,
            },
        )?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| ReconError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        self.index_dirty = false;
        Ok(())
    }
}

impl PartitionStorage for Partition {
    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let location = match self.index.get(key) {
            Some(&loc) => loc,
            None => return Err(ReconError::KeyNotFound),
        };

        match self.read_entry(location)? {
            Entry::Value(v) => Ok(v),
            Entry::Tombstone => Err(ReconError::KeyRemoved),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, &Entry::Value(value.to_vec()))
    }

    fn del(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, &Entry::Tombstone)
    }

    fn range(&mut self, cb: &mut dyn FnMut(&[u8], Entry) -> bool) -> Result<()> {
        let locations: Vec<(Vec<u8>, IndexEntry)> = self
            .index
            .iter()
            .map(|(k, loc)| (k.clone(), *loc))
            .collect();

        for (key, location) in locations {
            let entry = self.read_entry(location)?;
            if !cb(&key, entry) {
                break;
            }
        }
        Ok(())
    }

    fn created_at(&self) -> PartitionId {
        self.id
    }

    fn close(mut self) -> Result<()> {
        self.flush()?;
        tracing::debug!(id = self.id, keys = self.index.len(), "closed partition");
        Ok(())
    }
}

// =============================================================================
// File Naming
// =============================================================================

/// Which of the two files of a partition a path names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileRole {
    Log,
    Index,
}

/// "{dir}/{id}-partition.bin"
pub(crate) fn log_path(dir: &Path, id: PartitionId) -> PathBuf {
    dir.join(format!("{}-{}.{}", id, LOG_ROLE, FILE_EXT))
}

/// "{dir}/{id}-index.bin"
pub(crate) fn index_path(dir: &Path, id: PartitionId) -> PathBuf {
    dir.join(format!("{}-{}.{}", id, INDEX_ROLE, FILE_EXT))
}

fn tmp_index_path(dir: &Path, id: PartitionId) -> PathBuf {
    dir.join(format!("{}-{}.{}.tmp", id, INDEX_ROLE, FILE_EXT))
}

/// Parse a partition file name
/// "1700000000000000000-index.bin" → Some((1700000000000000000, Index))
pub(crate) fn parse_file_name(name: &str) -> Option<(PartitionId, FileRole)> {
    let stem = name.strip_suffix(FILE_EXT)?.strip_suffix('.')?;
    let (digits, role) = stem.split_once('-')?;
    let role = match role {
        LOG_ROLE => FileRole::Log,
        INDEX_ROLE => FileRole::Index,
        _ => return None,
    };

    // Canonical decimal only ("+5", "05" rejected), so the name matches the
    // paths rebuilt from the id
    let id: PartitionId = digits.parse().ok()?;
    if id.to_string() != digits {
        return None;
    }
    Some((id, role))
}

/// Whether a file name is a leftover temp index
pub(crate) fn is_tmp_index(name: &str) -> bool {
    name.strip_suffix(".tmp")
        .and_then(parse_file_name)
        .map_or(false, |(_, role)| role == FileRole::Index)
}

fn load_index(path: &Path) -> Result<HashMap<Vec<u8>, IndexEntry>> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Err(ReconError::Encoding(format!(
            "index file {} is empty",
            path.display()
        )));
    }

    // Decoding from memory: any failure, short reads included, is a bad file
    let file: IndexFile = bincode::deserialize(&bytes)
        .map_err(|e| ReconError::Encoding(format!("{}: {}", path.display(), e)))?;
    if file.version != INDEX_VERSION {
        return Err(ReconError::Encoding(format!(
            "unsupported index version {} in {}",
            file.version,
            path.display()
        )));
    }
    Ok(file.entries)
}

/// Per-thread write failures for exercising abort paths
#[cfg(test)]
pub(crate) mod fault {
    use std::cell::Cell;
    use std::io;

    thread_local! {
        static APPENDS_LEFT: Cell<Option<usize>> = Cell::new(None);
    }

    /// Let `n` more appends succeed on this thread, then fail every one
    pub(crate) fn fail_appends_after(n: usize) {
        APPENDS_LEFT.with(|c| c.set(Some(n)));
    }

    pub(crate) fn clear() {
        APPENDS_LEFT.with(|c| c.set(None));
    }

    pub(super) fn check_append() -> io::Result<()> {
        APPENDS_LEFT.with(|c| match c.get() {
            Some(0) => Err(io::Error::new(io::ErrorKind::Other, "injected append failure")),
            Some(n) => {
                c.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        })
    }
}
