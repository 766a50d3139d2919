//! MemTable Module
//!
//! In-memory write buffer for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Tombstones for deleted keys until they are flushed
//! - Track size for flush triggers
//! - Flush (sync) the whole buffer into a new partition
//!
//! ## Data Structure Choice
//! Partitions are indexed by exact key only, so a HashMap behind an RwLock
//! is enough; no ordering is kept.

mod table;

pub use table::MemTable;
