//! Tests for restart and snapshot install
//!
//! These tests verify:
//! - Start resumes after the last flushed index
//! - Replays over already-applied state are absorbed
//! - Snapshot install fast-forwards the applier and refuses stale snapshots

use std::sync::Arc;

use replicated_ids::apply::{
    CommandApplicationProcess, CoreStateMachines, InFlightCache, SessionTracker, SessionTrackerState,
};
use replicated_ids::config::Config;
use replicated_ids::id::IdType;
use replicated_ids::log::{InMemoryRaftLog, RaftLog};
use replicated_ids::protocol::{GlobalSession, ReplicatedContent};
use replicated_ids::state::{
    IdAllocationState, InMemoryStateStorage, ReplicatedIdAllocationStateMachine, StateStorage,
};
use replicated_ids::{IdError, MemberId};

use super::{allocation, append_all, harness, operation, SpyStateMachines, TIMEOUT};

struct RealMember {
    ledger: Arc<InMemoryStateStorage<IdAllocationState>>,
    machine: Arc<ReplicatedIdAllocationStateMachine>,
    process: CommandApplicationProcess,
}

fn real_member(
    log: Arc<InMemoryRaftLog>,
    ledger: Arc<InMemoryStateStorage<IdAllocationState>>,
    last_flushed: Arc<InMemoryStateStorage<i64>>,
) -> RealMember {
    let machine = Arc::new(ReplicatedIdAllocationStateMachine::new(ledger.clone()).unwrap());
    let sessions =
        SessionTracker::new(Arc::new(InMemoryStateStorage::new(SessionTrackerState::default()))).unwrap();
    let process = CommandApplicationProcess::new(
        log,
        Arc::new(InFlightCache::disabled()),
        Arc::new(CoreStateMachines::new(machine.clone())),
        sessions,
        last_flushed,
        &Config::default(),
    );
    RealMember {
        ledger,
        machine,
        process,
    }
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_start_resumes_after_last_flushed() {
    let h = harness(SpyStateMachines::default(), &Config::default());
    append_all(
        h.log.as_ref(),
        (0..5).map(|i| ReplicatedContent::Command(allocation(i * 10))).collect(),
    );
    h.last_flushed.persist_store_data(&2).unwrap();

    h.process.start().unwrap();
    assert_eq!(h.process.last_applied(), 2);
    h.process.notify_committed(4).unwrap();
    assert!(h.process.await_applied(4, TIMEOUT).unwrap());

    assert_eq!(h.spy.dispatched_indices(), vec![3, 4]);
}

#[test]
fn test_replay_over_newer_ledger_is_absorbed() {
    let log = Arc::new(InMemoryRaftLog::new());
    append_all(
        log.as_ref(),
        vec![
            ReplicatedContent::Command(allocation(0)),
            ReplicatedContent::NewLeaderBarrier,
            ReplicatedContent::Command(allocation(10)),
        ],
    );

    // Crash after the ledger was flushed at 2 but before the flushed index was
    let mut flushed = IdAllocationState::new();
    flushed.set_first_unallocated(IdType::Node, 20);
    flushed.set_applied_command_index(2);
    let ledger = Arc::new(InMemoryStateStorage::new(IdAllocationState::new()));
    ledger.persist_store_data(&flushed).unwrap();
    let last_flushed = Arc::new(InMemoryStateStorage::new(-1i64));
    last_flushed.persist_store_data(&1).unwrap();

    let member = real_member(log.clone(), ledger, last_flushed);
    member.process.start().unwrap();
    member.process.notify_committed(log.append_index()).unwrap();
    assert!(member.process.await_applied(2, TIMEOUT).unwrap());

    assert_eq!(member.machine.first_unallocated(IdType::Node), 20);
    assert_eq!(member.machine.last_applied_index(), 2);
}

#[test]
fn test_state_survives_stop_and_restart() {
    let log = Arc::new(InMemoryRaftLog::new());
    let ledger = Arc::new(InMemoryStateStorage::new(IdAllocationState::new()));
    let last_flushed = Arc::new(InMemoryStateStorage::new(-1i64));
    let session = GlobalSession::random(MemberId::random());
    append_all(log.as_ref(), vec![operation(session, 0, 0), operation(session, 1, 10)]);

    let first = real_member(log.clone(), ledger.clone(), last_flushed.clone());
    first.process.start().unwrap();
    first.process.notify_committed(1).unwrap();
    assert!(first.process.await_applied(1, TIMEOUT).unwrap());
    first.process.stop().unwrap();
    assert_eq!(first.ledger.initial_state().unwrap().first_unallocated(IdType::Node), 20);
    assert_eq!(last_flushed.initial_state().unwrap(), 1);

    append_all(log.as_ref(), vec![operation(session, 2, 20)]);
    let second = real_member(log.clone(), ledger, last_flushed);
    second.process.start().unwrap();
    second.process.notify_committed(2).unwrap();
    assert!(second.process.await_applied(2, TIMEOUT).unwrap());

    assert_eq!(second.machine.first_unallocated(IdType::Node), 30);
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_install_snapshot_fast_forwards() {
    let log = Arc::new(InMemoryRaftLog::new());
    let session = GlobalSession::random(MemberId::random());
    append_all(
        log.as_ref(),
        vec![operation(session, 0, 0), operation(session, 1, 10), operation(session, 2, 20)],
    );

    let leader = real_member(
        log.clone(),
        Arc::new(InMemoryStateStorage::new(IdAllocationState::new())),
        Arc::new(InMemoryStateStorage::new(-1i64)),
    );
    leader.process.start().unwrap();
    leader.process.notify_committed(2).unwrap();
    assert!(leader.process.await_applied(2, TIMEOUT).unwrap());
    let snapshot = leader.process.snapshot();
    assert_eq!(snapshot.prev_index, 2);

    let lagging_flushed = Arc::new(InMemoryStateStorage::new(-1i64));
    let lagging = real_member(
        log.clone(),
        Arc::new(InMemoryStateStorage::new(IdAllocationState::new())),
        lagging_flushed.clone(),
    );
    lagging.process.start().unwrap();
    lagging.process.install_snapshot(snapshot.clone()).unwrap();

    assert_eq!(lagging.process.last_applied(), 2);
    assert_eq!(lagging.machine.snapshot(), snapshot.id_allocation);
    assert_eq!(lagging_flushed.initial_state().unwrap(), 2);

    // Sessions came along: a replay of seq 2 is skipped, seq 3 applies
    append_all(log.as_ref(), vec![operation(session, 2, 30), operation(session, 3, 30)]);
    lagging.process.notify_committed(4).unwrap();
    assert!(lagging.process.await_applied(4, TIMEOUT).unwrap());
    assert_eq!(lagging.machine.first_unallocated(IdType::Node), 40);
}

#[test]
fn test_stale_snapshot_refused() {
    let log = Arc::new(InMemoryRaftLog::new());
    append_all(
        log.as_ref(),
        (0..3).map(|i| ReplicatedContent::Command(allocation(i * 10))).collect(),
    );
    let member = real_member(
        log,
        Arc::new(InMemoryStateStorage::new(IdAllocationState::new())),
        Arc::new(InMemoryStateStorage::new(-1i64)),
    );
    member.process.start().unwrap();
    let early = member.process.snapshot();
    member.process.notify_committed(2).unwrap();
    assert!(member.process.await_applied(2, TIMEOUT).unwrap());

    let result = member.process.install_snapshot(early);
    assert!(matches!(
        result,
        Err(IdError::StaleSnapshot {
            snapshot_index: -1,
            last_applied: 2
        })
    ));
    assert_eq!(member.machine.first_unallocated(IdType::Node), 30);
}
