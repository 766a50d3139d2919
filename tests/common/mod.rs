//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reconkv::config::IndexPersistence;
use reconkv::storage::PartitionSet;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test writer (RUST_LOG=reconkv=debug to see them)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup_temp_dir() -> (TempDir, PathBuf) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

pub fn setup_partition_set() -> (TempDir, Arc<PartitionSet>) {
    let (temp, path) = setup_temp_dir();
    let set = PartitionSet::open(&path, IndexPersistence::EveryWrite).unwrap();
    (temp, Arc::new(set))
}

/// Number of `*.bin` files in a directory
pub fn count_partition_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "bin"))
        .count()
}
