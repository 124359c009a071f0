//! Tests for InFlightCache

use replicated_ids::apply::InFlightCache;
use replicated_ids::log::LogEntry;
use replicated_ids::protocol::ReplicatedContent;

fn barrier(index: i64) -> LogEntry {
    LogEntry::new(1, index, ReplicatedContent::NewLeaderBarrier)
}

#[test]
fn test_put_and_get() {
    let cache = InFlightCache::new(true, 8, 1024);
    for i in 0..3 {
        cache.put(barrier(i));
    }

    assert_eq!(cache.get(1), Some(barrier(1)));
    assert_eq!(cache.get(3), None);
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 1);
}

#[test]
fn test_evicts_oldest_over_entry_limit() {
    let cache = InFlightCache::new(true, 2, 1024);
    for i in 0..4 {
        cache.put(barrier(i));
    }

    assert_eq!(cache.len(), 2);
    assert!(cache.get(1).is_none());
    assert!(cache.get(2).is_some());
    assert!(cache.get(3).is_some());
}

#[test]
fn test_evicts_oldest_over_byte_limit() {
    // A barrier costs 17 bytes
    let cache = InFlightCache::new(true, 100, 40);
    for i in 0..5 {
        cache.put(barrier(i));
    }

    assert_eq!(cache.len(), 2);
    assert!(cache.total_bytes() <= 40);
    assert!(cache.get(4).is_some());
}

#[test]
fn test_gap_restarts_cache() {
    let cache = InFlightCache::new(true, 8, 1024);
    cache.put(barrier(0));
    cache.put(barrier(1));
    cache.put(barrier(5));

    assert_eq!(cache.len(), 1);
    assert!(cache.get(0).is_none());
    assert!(cache.get(5).is_some());
}

#[test]
fn test_prune_and_truncate() {
    let cache = InFlightCache::new(true, 8, 1024);
    for i in 0..6 {
        cache.put(barrier(i));
    }

    cache.prune(1);
    assert!(cache.get(1).is_none());
    assert!(cache.get(2).is_some());

    cache.truncate(4);
    assert!(cache.get(4).is_none());
    assert_eq!(cache.len(), 2);

    // Appending continues after the truncation point
    cache.put(barrier(4));
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_disabled_cache_holds_nothing() {
    let cache = InFlightCache::disabled();
    cache.put(barrier(0));
    assert!(cache.is_empty());
    assert!(cache.get(0).is_none());
}
