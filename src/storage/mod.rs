//! Storage Module
//!
//! Persistent storage layer built from partitions (log + index segments).
//!
//! ## Responsibilities
//! - Persist flushed memtables as new partitions
//! - Point lookups through per-partition key indexes
//! - Track opened vs. available partitions
//! - Merge all partitions into one (compaction)
//!
//! ## On-disk Layout (per partition `T`)
//! ```text
//! {data_dir}/
//!   ├── T-partition.bin   append-only value log
//!   │     [Tag(1)][CRC32(4)][Payload] [Tag(1)][CRC32(4)][Payload] ...
//!   │     (no delimiters; records are addressed via the index)
//!   └── T-index.bin       bincode { version, key → (offset, length) }
//! ```

mod compaction;
mod partition;
mod record;
mod set;

pub use compaction::MergeStats;
pub use partition::{Partition, PartitionId, PartitionStorage};
pub use record::{Entry, IndexEntry};
pub use set::PartitionSet;

#[cfg(test)]
pub(crate) use partition::fault;
