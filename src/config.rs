//! Configuration for ReconKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{ReconError, Result};

/// Main configuration for a ReconKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all partition files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {id}-partition.bin   (append-only value log)
    ///     └── {id}-index.bin       (key → offset/length index)
    pub data_dir: PathBuf,

    /// When a partition's index file is rewritten
    pub index_persistence: IndexPersistence,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Approximate memtable size (in bytes) that triggers an automatic sync.
    /// `None` leaves syncing entirely to the caller.
    pub memtable_size_limit: Option<usize>,
}

/// Index persistence strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPersistence {
    /// Rewrite the index file after every set/del (crash tolerant, O(index) per write)
    #[default]
    EveryWrite,

    /// Keep index changes in memory until the partition is flushed or closed
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./reconkv_data"),
            index_persistence: IndexPersistence::EveryWrite,
            memtable_size_limit: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ReconError::Config("data_dir must not be empty".to_string()));
        }
        if self.memtable_size_limit == Some(0) {
            return Err(ReconError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all partitions)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the index persistence strategy
    pub fn index_persistence(mut self, strategy: IndexPersistence) -> Self {
        self.config.index_persistence = strategy;
        self
    }

    /// Sync the memtable automatically once it holds `size` bytes
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = Some(size);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
