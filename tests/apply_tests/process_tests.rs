//! Tests for CommandApplicationProcess
//!
//! These tests verify:
//! - Deduplication of replayed operations
//! - Command index advancing once per entry
//! - Batching and flush cadence
//! - Fatal halt on dispatch failure, panic and missing entries
//! - Use of the in-flight cache

use std::time::Instant;

use replicated_ids::apply::InFlightCache;
use replicated_ids::config::Config;
use replicated_ids::log::LogEntry;
use replicated_ids::protocol::{GlobalSession, ReplicatedContent};
use replicated_ids::state::StateStorage;
use replicated_ids::{IdError, MemberId, ReplicationError};

use super::{allocation, append_all, harness, harness_with_cache, operation, SpyStateMachines, TIMEOUT};

fn commands(count: u64) -> Vec<ReplicatedContent> {
    (0..count)
        .map(|i| ReplicatedContent::Command(allocation(i * 10)))
        .collect()
}

// =============================================================================
// Dedup Tests
// =============================================================================

#[test]
fn test_duplicate_operation_dispatched_once() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    let session = GlobalSession::random(MemberId::random());
    append_all(
        h.log.as_ref(),
        vec![
            ReplicatedContent::NewLeaderBarrier,
            operation(session, 0, 0),
            operation(session, 0, 0),
            operation(session, 1, 10),
        ],
    );

    h.process.start().unwrap();
    h.process.notify_committed(3).unwrap();
    assert!(h.process.await_applied(3, TIMEOUT).unwrap());

    assert_eq!(h.spy.dispatched_indices(), vec![1, 3]);
    assert_eq!(h.process.last_applied(), 3);
    h.process.stop().unwrap();
}

#[test]
fn test_duplicate_operation_releases_waiter() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    let session = GlobalSession::random(MemberId::random());
    append_all(h.log.as_ref(), vec![operation(session, 0, 0)]);
    h.process.start().unwrap();
    h.process.notify_committed(0).unwrap();
    assert!(h.process.await_applied(0, TIMEOUT).unwrap());

    // A retransmission of the same operation
    let retransmitted = match operation(session, 0, 0) {
        ReplicatedContent::Operation(operation) => operation,
        other => panic!("expected an operation, got {:?}", other),
    };
    let progress = h.process.progress_tracker().start(&retransmitted);
    append_all(h.log.as_ref(), vec![ReplicatedContent::Operation(retransmitted)]);
    h.process.notify_committed(1).unwrap();

    let started = Instant::now();
    assert!(matches!(progress.await_result(TIMEOUT), Err(ReplicationError::Unavailable(_))));
    assert!(started.elapsed() < TIMEOUT);
    assert!(h.process.await_applied(1, TIMEOUT).unwrap());
    assert_eq!(h.process.progress_tracker().in_progress_count(), 0);
    assert_eq!(h.spy.dispatched_indices(), vec![0]);
    h.process.stop().unwrap();
}

#[test]
fn test_new_global_session_is_not_a_duplicate() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    let owner = MemberId::random();
    let first = GlobalSession::random(owner);
    let restarted = GlobalSession::random(owner);
    append_all(
        h.log.as_ref(),
        vec![operation(first, 0, 0), operation(first, 1, 10), operation(restarted, 0, 20)],
    );

    h.process.start().unwrap();
    h.process.notify_committed(2).unwrap();
    assert!(h.process.await_applied(2, TIMEOUT).unwrap());

    assert_eq!(h.spy.dispatched_indices(), vec![0, 1, 2]);
}

#[test]
fn test_command_index_advances_for_every_entry() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    let session = GlobalSession::random(MemberId::random());
    append_all(
        h.log.as_ref(),
        vec![
            ReplicatedContent::NewLeaderBarrier,
            operation(session, 0, 0),
            operation(session, 0, 0),
            ReplicatedContent::NewLeaderBarrier,
        ],
    );

    h.process.start().unwrap();
    h.process.notify_committed(3).unwrap();
    assert!(h.process.await_applied(3, TIMEOUT).unwrap());

    let status = h.process.status();
    assert_eq!(status.command_index, 3);
    assert_eq!(status.last_applied, 3);
    assert_eq!(status.commit_index, 3);
    assert_eq!(h.process.command_index_tracker().applied_command_index(), 3);
}

// =============================================================================
// Batch / Flush Tests
// =============================================================================

#[test]
fn test_batches_are_bounded() {
    let config = Config::builder().apply_batch_size(2).build();
    let h = harness(SpyStateMachines::default(), &config);
    append_all(h.log.as_ref(), commands(5));

    h.process.start().unwrap();
    h.process.notify_committed(4).unwrap();
    assert!(h.process.await_applied(4, TIMEOUT).unwrap());

    assert_eq!(h.spy.batch_count(), 3);
    assert_eq!(h.spy.dispatched_indices(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_flush_cadence() {
    let config = Config::builder().flush_every(2).build();
    let h = harness(SpyStateMachines::default(), &config);
    append_all(h.log.as_ref(), commands(5));

    h.process.start().unwrap();
    h.process.notify_committed(4).unwrap();
    assert!(h.process.await_applied(4, TIMEOUT).unwrap());

    assert_eq!(h.process.status().last_flushed, 3);
    assert_eq!(h.spy.flush_count(), 2);
    assert_eq!(h.last_flushed.initial_state().unwrap(), 3);

    // Stopping flushes the remainder
    h.process.stop().unwrap();
    assert_eq!(h.spy.flush_count(), 3);
    assert_eq!(h.last_flushed.initial_state().unwrap(), 4);
}

#[test]
fn test_commit_notifications_coalesce() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    append_all(h.log.as_ref(), commands(6));

    h.process.start().unwrap();
    for index in [1, 0, 5, 3] {
        h.process.notify_committed(index).unwrap();
    }
    assert!(h.process.await_applied(5, TIMEOUT).unwrap());
    assert_eq!(h.spy.dispatched_indices(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_await_applied_times_out() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    h.process.start().unwrap();
    assert!(!h.process.await_applied(0, std::time::Duration::from_millis(20)).unwrap());
}

#[test]
fn test_start_twice_fails() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    h.process.start().unwrap();
    assert!(matches!(h.process.start(), Err(IdError::AlreadyStarted)));
}

// =============================================================================
// Fatal Halt Tests
// =============================================================================

#[test]
fn test_dispatch_failure_halts_application() {
    let spy = SpyStateMachines {
        fail_at: Some(2),
        ..Default::default()
    };
    let h = harness(spy, &Config::default());
    append_all(h.log.as_ref(), commands(6));

    h.process.start().unwrap();
    h.process.notify_committed(5).unwrap();

    assert!(matches!(h.process.await_applied(5, TIMEOUT), Err(IdError::Unhealthy(_))));
    assert!(!h.process.health().is_healthy());
    assert!(h.process.health().cause().unwrap().contains("refusing command 2"));
    assert_eq!(h.process.last_applied(), 1);

    // Nothing past the failed index is ever dispatched
    assert!(h.process.notify_committed(5).is_err());
    assert_eq!(h.spy.dispatched_indices(), vec![0, 1]);
}

#[test]
fn test_dispatch_panic_halts_application() {
    let spy = SpyStateMachines {
        panic_at: Some(1),
        ..Default::default()
    };
    let h = harness(spy, &Config::default());
    append_all(h.log.as_ref(), commands(3));

    h.process.start().unwrap();
    h.process.notify_committed(2).unwrap();

    assert!(h.process.await_applied(2, TIMEOUT).is_err());
    assert!(h.process.health().cause().unwrap().contains("blew up at 1"));
    assert_eq!(h.spy.dispatched_indices(), vec![0]);
}

#[test]
fn test_missing_entry_halts_application() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    append_all(h.log.as_ref(), commands(1));

    h.process.start().unwrap();
    h.process.notify_committed(2).unwrap();

    assert!(h.process.await_applied(2, TIMEOUT).is_err());
    assert!(h.process.health().cause().unwrap().contains("Committed entry 1"));
    assert_eq!(h.spy.dispatched_indices(), vec![0]);
}

#[test]
fn test_failure_aborts_waiting_proposers() {
    let spy = SpyStateMachines {
        fail_at: Some(0),
        ..Default::default()
    };
    let h = harness(spy, &Config::default());
    let session = GlobalSession::random(MemberId::random());
    let content = operation(session, 0, 0);
    let progress = match &content {
        ReplicatedContent::Operation(op) => h.process.progress_tracker().start(op),
        _ => unreachable!(),
    };
    append_all(h.log.as_ref(), vec![content]);

    h.process.start().unwrap();
    h.process.notify_committed(0).unwrap();

    assert!(progress.await_result(TIMEOUT).is_err());
    assert_eq!(h.process.progress_tracker().in_progress_count(), 0);
}

// =============================================================================
// In-Flight Cache Tests
// =============================================================================

#[test]
fn test_entries_served_from_cache() {
    let h = harness_with_cache(
        SpyStateMachines::default(),
        &Config::default(),
        InFlightCache::new(true, 16, 1024 * 1024),
    );
    // Only the cache has these entries
    for (index, content) in commands(3).into_iter().enumerate() {
        h.cache.put(LogEntry::new(1, index as i64, content));
    }

    h.process.start().unwrap();
    h.process.notify_committed(2).unwrap();
    assert!(h.process.await_applied(2, TIMEOUT).unwrap());

    assert_eq!(h.cache.hits(), 3);
    assert!(h.cache.is_empty(), "applied entries are pruned");
}
