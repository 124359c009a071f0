//! Log entry definitions

use crate::protocol::ReplicatedContent;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Term of the leader that appended the entry
    pub term: u64,

    /// Position in the log
    pub index: i64,

    pub content: ReplicatedContent,
}

impl LogEntry {
    pub fn new(term: u64, index: i64, content: ReplicatedContent) -> Self {
        Self { term, index, content }
    }
}
