//! Compaction
//!
//! Merges every partition of a [`PartitionSet`] into a single new partition.
//!
//! ## Algorithm
//! 1. Nothing to do with zero or one partition
//! 2. Visit partitions oldest → newest; a newer entry for a key replaces an older one
//! 3. Drop keys whose newest entry is a tombstone
//! 4. Write survivors into a new partition and make it durable
//! 5. Close old partitions and delete their files
//! 6. The set now holds only the new partition (opened)
//!
//! Any failure before step 5 discards the new partition and leaves the old
//! ones untouched.

use std::collections::HashMap;

use crate::error::Result;

use super::partition::{self, Partition, PartitionStorage};
use super::record::Entry;
use super::set::PartitionSet;

/// Outcome of a merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of partitions that were replaced
    pub partitions_merged: usize,
    /// Live keys written to the merged partition
    pub keys_written: usize,
    /// Keys dropped because their newest entry was a tombstone
    pub tombstones_dropped: usize,
}

impl PartitionSet {
    /// Merge all partitions into one, discarding superseded and deleted keys
    pub fn merge_sort(&self) -> Result<MergeStats> {
        let mut state = self.lock_state();

        let old_ids = state.ids_oldest_first();
        if old_ids.len() <= 1 {
            tracing::debug!(partitions = old_ids.len(), "merge skipped");
            return Ok(MergeStats::default());
        }

        // Step 2: oldest first, so the newest entry for each key wins
        let mut latest: HashMap<Vec<u8>, Entry> = HashMap::new();
        self.visit(&mut state, old_ids.clone(), |_, p| {
            p.range(&mut |key, entry| {
                latest.insert(key.to_vec(), entry);
                true
            })?;
            Ok(true)
        })?;

        // Steps 3-4
        let mut merged = self.create_bulk_partition()?;
        let merged_id = merged.created_at();
        let keys_written = match write_survivors(&mut merged, &latest) {
            Ok(n) => n,
            Err(e) => {
                if let Err(cleanup) = merged.discard() {
                    tracing::warn!(id = merged_id, error = %cleanup, "failed to discard merge output");
                }
                return Err(e);
            }
        };
        let tombstones_dropped = latest.len() - keys_written;

        tracing::debug!(
            id = merged_id,
            keys = keys_written,
            "merged partition durable, removing old partitions"
        );

        // Step 5: everything old is superseded by the durable merged partition
        for (id, p) in std::mem::take(&mut state.opened) {
            if let Err(e) = p.close() {
                tracing::warn!(id, error = %e, "failed to close superseded partition");
            }
        }

        let mut leftover = Vec::new();
        let mut first_err = None;
        for &id in old_ids.iter().filter(|&&id| id != merged_id) {
            if let Err(e) = Partition::remove_files(self.dir(), id) {
                tracing::warn!(id, error = %e, "failed to delete superseded partition");
                // Without its index the partition is unreadable; a restart
                // skips the stray log as an orphan
                if partition::index_path(self.dir(), id).exists() {
                    leftover.push(id);
                }
                first_err.get_or_insert(e);
            }
        }

        // Step 6. Undeleted leftovers are older than the merged partition, so
        // reads still resolve to the merged data.
        state.available = leftover.into_iter().collect();
        state.opened.insert(merged_id, merged);

        let stats = MergeStats {
            partitions_merged: old_ids.len(),
            keys_written,
            tombstones_dropped,
        };

        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::info!(
                    id = merged_id,
                    partitions = stats.partitions_merged,
                    keys = stats.keys_written,
                    tombstones = stats.tombstones_dropped,
                    "merge complete"
                );
                Ok(stats)
            }
        }
    }
}

/// Write every live entry and make the partition durable
fn write_survivors(p: &mut Partition, latest: &HashMap<Vec<u8>, Entry>) -> Result<usize> {
    let mut written = 0;
    for (key, entry) in latest {
        if let Entry::Value(value) = entry {
            p.set(key, value)?;
            written += 1;
        }
    }
    p.flush()?;
    Ok(written)
}
