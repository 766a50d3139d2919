//! # ReconKV
//!
//! An embeddable, single-process key-value storage engine with:
//! - An in-memory write buffer (memtable) with tombstones
//! - Immutable on-disk partitions (append-only value log + key index)
//! - On-demand compaction that merges every partition into one
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │               (one lock around every operation)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐   sync   ┌──────────────┐   merge_sort
//!   │  MemTable   │ ───────▶ │ PartitionSet │ ◀──────────┐
//!   │  (RwLock)   │          │   (Mutex)    │ ───────────┘
//!   └─────────────┘          └──────┬───────┘
//!                                   │ owns
//!                                   ▼
//!                      ┌──────────────────────────┐
//!                      │ Partition (log + index)  │ ...
//!                      └──────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ReconError, Result};
pub use config::{Config, IndexPersistence};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ReconKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
