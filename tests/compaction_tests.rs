//! Tests for compaction (merge_sort)
//!
//! These tests verify:
//! - No-op with zero or one partition
//! - Newest partition wins for duplicate keys
//! - Tombstones are garbage-collected
//! - Old files are deleted and only the merged partition remains
//! - Merged data survives a restart

mod common;

use std::sync::Arc;

use common::{count_partition_files, setup_partition_set, setup_temp_dir};
use reconkv::config::IndexPersistence;
use reconkv::memtable::MemTable;
use reconkv::storage::{MergeStats, PartitionSet, PartitionStorage};
use reconkv::ReconError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_memtable() -> (tempfile::TempDir, Arc<PartitionSet>, MemTable) {
    let (temp, set) = setup_partition_set();
    let memtable = MemTable::new(Arc::clone(&set));
    (temp, set, memtable)
}

// =============================================================================
// No-op Tests
// =============================================================================

#[test]
fn test_merge_empty_set_is_noop() {
    let (_temp, set) = setup_partition_set();

    let stats = set.merge_sort().unwrap();

    assert_eq!(stats, MergeStats::default());
    assert_eq!(set.partition_count(), 0);
    assert_eq!(count_partition_files(set.dir()), 0);
}

#[test]
fn test_merge_single_partition_is_noop() {
    let (_temp, set, memtable) = setup_memtable();
    memtable.set(b"a", b"1");
    memtable.del(b"a").unwrap();
    let id = memtable.sync().unwrap().unwrap();

    let stats = set.merge_sort().unwrap();

    assert_eq!(stats, MergeStats::default());
    assert_eq!(set.partition_count(), 1);
    assert!(set.get_available_partitions().contains(&id));
    // Tombstone untouched: nothing was rewritten
    assert!(matches!(set.get(b"a"), Err(ReconError::KeyRemoved)));
}

// =============================================================================
// Conflict Resolution Tests
// =============================================================================

#[test]
fn test_merge_newest_value_wins() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"k", b"a");
    memtable.sync().unwrap();
    memtable.set(b"k", b"b");
    memtable.sync().unwrap();

    set.merge_sort().unwrap();

    assert_eq!(set.get(b"k").unwrap(), b"b".to_vec());
}

#[test]
fn test_merge_newest_wins_across_many_partitions() {
    let (_temp, set, memtable) = setup_memtable();

    for round in 0..10 {
        for key in 0..20 {
            memtable.set(
                format!("key{}", key).as_bytes(),
                format!("round{}", round).as_bytes(),
            );
        }
        memtable.sync().unwrap();
    }

    let stats = set.merge_sort().unwrap();

    assert_eq!(stats.partitions_merged, 10);
    assert_eq!(stats.keys_written, 20);
    for key in 0..20 {
        assert_eq!(
            set.get(format!("key{}", key).as_bytes()).unwrap(),
            b"round9".to_vec()
        );
    }
}

#[test]
fn test_merge_newer_tombstone_beats_older_value() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"k", b"v");
    memtable.sync().unwrap();

    let mut newer = set.create_partition().unwrap();
    newer.del(b"k").unwrap();
    set.close_partition(newer).unwrap();

    let stats = set.merge_sort().unwrap();

    assert_eq!(stats.tombstones_dropped, 1);
    assert!(matches!(set.get(b"k"), Err(ReconError::KeyNotFound)));
}

#[test]
fn test_merge_drops_lone_tombstone() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"keep", b"1");
    memtable.sync().unwrap();
    memtable.set(b"gone", b"x");
    memtable.del(b"gone").unwrap();
    memtable.sync().unwrap();

    set.merge_sort().unwrap();

    // Not KeyRemoved: the tombstone itself is gone
    assert!(matches!(set.get(b"gone"), Err(ReconError::KeyNotFound)));
    assert_eq!(set.get(b"keep").unwrap(), b"1".to_vec());
}

#[test]
fn test_merge_includes_opened_partitions() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"a", b"1");
    let first = memtable.sync().unwrap().unwrap();
    memtable.set(b"b", b"2");
    memtable.sync().unwrap();
    set.open_partition(first).unwrap();

    set.merge_sort().unwrap();

    assert_eq!(set.get(b"a").unwrap(), b"1".to_vec());
    assert_eq!(set.get(b"b").unwrap(), b"2".to_vec());
}

// =============================================================================
// Resulting State Tests
// =============================================================================

#[test]
fn test_merge_leaves_single_opened_partition() {
    let (_temp, set, memtable) = setup_memtable();

    for i in 0..3 {
        memtable.set(format!("k{}", i).as_bytes(), b"v");
        memtable.sync().unwrap();
    }
    assert_eq!(count_partition_files(set.dir()), 6);

    set.merge_sort().unwrap();

    assert_eq!(set.partition_count(), 1);
    assert_eq!(set.opened_count(), 1);
    assert!(set.get_available_partitions().is_empty());
    assert_eq!(count_partition_files(set.dir()), 2);
}

#[test]
fn test_merged_partition_is_newest() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"a", b"1");
    memtable.sync().unwrap();
    memtable.set(b"b", b"2");
    let last = memtable.sync().unwrap().unwrap();

    set.merge_sort().unwrap();

    let mut merged_id = 0;
    set.range(|id, _| {
        merged_id = id;
        true
    })
    .unwrap();
    assert!(merged_id > last);
}

#[test]
fn test_repeated_merges() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"a", b"1");
    memtable.sync().unwrap();
    memtable.set(b"b", b"2");
    memtable.sync().unwrap();
    set.merge_sort().unwrap();

    memtable.set(b"a", b"updated");
    memtable.sync().unwrap();
    let stats = set.merge_sort().unwrap();

    assert_eq!(stats.partitions_merged, 2);
    assert_eq!(set.partition_count(), 1);
    assert_eq!(set.get(b"a").unwrap(), b"updated".to_vec());
    assert_eq!(set.get(b"b").unwrap(), b"2".to_vec());
}

#[test]
fn test_merge_survives_restart() {
    let (_temp, path) = setup_temp_dir();

    {
        let set = Arc::new(PartitionSet::open(&path, IndexPersistence::EveryWrite).unwrap());
        let memtable = MemTable::new(Arc::clone(&set));
        memtable.set(b"a", b"1");
        memtable.sync().unwrap();
        memtable.set(b"a", b"3");
        memtable.set(b"b", b"2");
        memtable.sync().unwrap();
        set.merge_sort().unwrap();
        set.close_all().unwrap();
    }

    let set = PartitionSet::open(&path, IndexPersistence::EveryWrite).unwrap();
    assert_eq!(set.partition_count(), 1);
    assert_eq!(set.get(b"a").unwrap(), b"3".to_vec());
    assert_eq!(set.get(b"b").unwrap(), b"2".to_vec());
}

#[test]
fn test_merged_partition_contents() {
    let (_temp, set, memtable) = setup_memtable();

    memtable.set(b"a", b"1");
    memtable.set(b"b", b"2");
    memtable.sync().unwrap();
    memtable.set(b"a", b"3");
    memtable.set(b"c", b"x");
    memtable.del(b"c").unwrap();
    memtable.sync().unwrap();

    set.merge_sort().unwrap();

    let mut contents = Vec::new();
    set.range(|_, p| {
        p.range(&mut |k, entry| {
            contents.push((k.to_vec(), entry));
            true
        })
        .unwrap();
        true
    })
    .unwrap();
    contents.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0].1.value(), Some(&b"3"[..]));
    assert_eq!(contents[1].1.value(), Some(&b"2"[..]));
}
