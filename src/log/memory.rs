//! In-memory replicated log

use parking_lot::RwLock;

use crate::error::{IdError, Result};

use super::{LogEntry, RaftLog};

/// Log kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRaftLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemoryRaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RaftLog for InMemoryRaftLog {
    fn append(&self, entry: LogEntry) -> Result<i64> {
        let mut entries = self.entries.write();
        let expected = entries.len() as i64;
        if entry.index != expected {
            return Err(IdError::Corruption(format!(
                "Out of order append: expected index {}, got {}",
                expected, entry.index
            )));
        }
        entries.push(entry);
        Ok(expected)
    }

    fn read_entry(&self, index: i64) -> Result<Option<LogEntry>> {
        if index < 0 {
            return Ok(None);
        }
        Ok(self.entries.read().get(index as usize).cloned())
    }

    fn append_index(&self) -> i64 {
        self.entries.read().len() as i64 - 1
    }

    fn truncate(&self, from_index: i64) -> Result<()> {
        let mut entries = self.entries.write();
        let keep = from_index.max(0) as usize;
        entries.truncate(keep);
        Ok(())
    }
}
