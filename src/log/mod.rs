//! Replicated Log Module
//!
//! The committed, totally ordered sequence of entries the apply pipeline
//! consumes. The consensus layer owns appends and truncation; the apply
//! pipeline only reads.
//!
//! ## Durable File Format
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Record 1                                         │
//! │ ┌───────────┬─────────┬─────────┬──────────────┐ │
//! │ │ Index (8) │ CRC (4) │ Len (4) │ Data         │ │
//! │ └───────────┴─────────┴─────────┴──────────────┘ │
//! ├──────────────────────────────────────────────────┤
//! │ Record 2 ...                                     │
//! └──────────────────────────────────────────────────┘
//!
//! Data = Term (8) + encoded content
//! ```

mod entry;
mod memory;
mod file;

pub use entry::LogEntry;
pub use memory::InMemoryRaftLog;
pub use file::{FileRaftLog, LogRecoveryResult, RECORD_HEADER_SIZE};

use crate::error::Result;

/// Read/append access to the replicated log
///
/// Indices start at 0; -1 means "no entry".
pub trait RaftLog: Send + Sync {
    /// Append an entry whose index must be `append_index() + 1`
    fn append(&self, entry: LogEntry) -> Result<i64>;

    /// Read the entry at `index`, `None` if the log does not hold it
    fn read_entry(&self, index: i64) -> Result<Option<LogEntry>>;

    /// Index of the last appended entry, -1 when empty
    fn append_index(&self) -> i64;

    /// Drop every entry at or after `from_index` (superseded entries)
    fn truncate(&self, from_index: i64) -> Result<()>;
}
