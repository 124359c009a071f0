//! Tests for InMemoryRaftLog

use replicated_ids::log::{InMemoryRaftLog, LogEntry, RaftLog};
use replicated_ids::protocol::ReplicatedContent;

fn barrier(term: u64, index: i64) -> LogEntry {
    LogEntry::new(term, index, ReplicatedContent::NewLeaderBarrier)
}

#[test]
fn test_append_read_truncate() {
    let log = InMemoryRaftLog::new();
    assert!(log.is_empty());
    assert_eq!(log.append_index(), -1);

    for i in 0..4 {
        assert_eq!(log.append(barrier(1, i)).unwrap(), i);
    }
    assert_eq!(log.len(), 4);
    assert_eq!(log.read_entry(3).unwrap(), Some(barrier(1, 3)));

    log.truncate(1).unwrap();
    assert_eq!(log.append_index(), 0);
    assert!(log.read_entry(1).unwrap().is_none());
}

#[test]
fn test_gap_rejected() {
    let log = InMemoryRaftLog::new();
    log.append(barrier(1, 0)).unwrap();
    assert!(log.append(barrier(1, 2)).is_err());
    assert_eq!(log.len(), 1);
}
