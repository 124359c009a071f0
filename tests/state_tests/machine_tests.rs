//! Tests for ReplicatedIdAllocationStateMachine
//!
//! These tests verify:
//! - Acceptance only at the current high-water mark
//! - Replayed command indices are ignored without a callback
//! - Snapshots are independent copies
//! - Flush persists the ledger

use std::sync::Arc;

use replicated_ids::apply::CommandResult;
use replicated_ids::id::{IdType, ReplicatedIdAllocationRequest};
use replicated_ids::state::{
    IdAllocationState, InMemoryStateStorage, ReplicatedIdAllocationStateMachine, StateStorage,
};
use replicated_ids::MemberId;

use super::{fresh_machine, Recorder};

fn request(id_type: IdType, start: u64, length: u32) -> ReplicatedIdAllocationRequest {
    ReplicatedIdAllocationRequest::new(MemberId::from_u128(0xA), id_type, start, length)
}

const ACCEPTED: CommandResult = CommandResult::IdAllocation { accepted: true };
const REJECTED: CommandResult = CommandResult::IdAllocation { accepted: false };

// =============================================================================
// Acceptance Tests
// =============================================================================

#[test]
fn test_first_request_on_fresh_state_accepted() {
    let machine = fresh_machine();
    let recorder = Recorder::default();

    machine.apply_command(&request(IdType::Node, 0, 10), 0, recorder.callback());

    assert_eq!(recorder.results(), vec![ACCEPTED]);
    assert_eq!(machine.first_unallocated(IdType::Node), 10);
    assert_eq!(machine.last_applied_index(), 0);
}

#[test]
fn test_same_request_at_later_index_rejected() {
    let machine = fresh_machine();
    let recorder = Recorder::default();

    machine.apply_command(&request(IdType::Node, 0, 10), 0, recorder.callback());
    machine.apply_command(&request(IdType::Node, 0, 10), 5, recorder.callback());

    assert_eq!(recorder.results(), vec![ACCEPTED, REJECTED]);
    assert_eq!(machine.first_unallocated(IdType::Node), 10);
    assert_eq!(machine.last_applied_index(), 5);
}

#[test]
fn test_racing_proposals_only_first_wins() {
    let machine = fresh_machine();
    let recorder = Recorder::default();

    // Two members both saw first_unallocated == 0
    machine.apply_command(&request(IdType::Relationship, 0, 100), 0, recorder.callback());
    machine.apply_command(&request(IdType::Relationship, 0, 50), 1, recorder.callback());
    // The loser retries from the new mark
    machine.apply_command(&request(IdType::Relationship, 100, 50), 2, recorder.callback());

    assert_eq!(recorder.results(), vec![ACCEPTED, REJECTED, ACCEPTED]);
    assert_eq!(machine.first_unallocated(IdType::Relationship), 150);
}

#[test]
fn test_types_are_independent() {
    let machine = fresh_machine();
    let recorder = Recorder::default();

    machine.apply_command(&request(IdType::Node, 0, 10), 0, recorder.callback());
    machine.apply_command(&request(IdType::Property, 0, 32), 1, recorder.callback());

    assert_eq!(recorder.results(), vec![ACCEPTED, ACCEPTED]);
    assert_eq!(machine.first_unallocated(IdType::Node), 10);
    assert_eq!(machine.first_unallocated(IdType::Property), 32);
    assert_eq!(machine.first_unallocated(IdType::LabelToken), 0);
}

// =============================================================================
// Idempotency Tests
// =============================================================================

#[test]
fn test_replayed_index_ignored_without_callback() {
    let machine = fresh_machine();
    let recorder = Recorder::default();

    machine.apply_command(&request(IdType::Node, 0, 10), 3, recorder.callback());
    let before = machine.snapshot();

    machine.apply_command(&request(IdType::Node, 10, 10), 3, recorder.callback());
    machine.apply_command(&request(IdType::Node, 10, 10), 1, recorder.callback());

    assert_eq!(recorder.results(), vec![ACCEPTED]);
    assert_eq!(machine.snapshot(), before);
}

// =============================================================================
// Snapshot / Flush Tests
// =============================================================================

#[test]
fn test_snapshot_is_independent_copy() {
    let machine = fresh_machine();
    machine.apply_command(&request(IdType::Node, 0, 10), 0, Recorder::default().callback());

    let snapshot = machine.snapshot();
    machine.apply_command(&request(IdType::Node, 10, 10), 1, Recorder::default().callback());

    assert_eq!(snapshot.first_unallocated(IdType::Node), 10);
    assert_eq!(snapshot.applied_command_index(), 0);
    assert_eq!(machine.first_unallocated(IdType::Node), 20);
}

#[test]
fn test_install_snapshot_replaces_state() {
    let machine = fresh_machine();
    machine.apply_command(&request(IdType::Node, 0, 10), 0, Recorder::default().callback());

    let mut incoming = IdAllocationState::new();
    incoming.set_first_unallocated(IdType::Schema, 7);
    incoming.set_applied_command_index(40);
    machine.install_snapshot(incoming.clone());

    assert_eq!(machine.snapshot(), incoming);
    assert_eq!(machine.first_unallocated(IdType::Node), 0);

    // Commands at or below the snapshot index are replays now
    let recorder = Recorder::default();
    machine.apply_command(&request(IdType::Node, 0, 10), 40, recorder.callback());
    assert!(recorder.results().is_empty());
}

#[test]
fn test_flush_persists_and_reloads() {
    let storage = Arc::new(InMemoryStateStorage::new(IdAllocationState::new()));
    let machine = ReplicatedIdAllocationStateMachine::new(storage.clone()).unwrap();

    machine.apply_command(&request(IdType::Node, 0, 10), 0, Recorder::default().callback());
    assert!(!storage.has_persisted());
    machine.flush().unwrap();
    assert_eq!(storage.initial_state().unwrap().first_unallocated(IdType::Node), 10);

    let reloaded = ReplicatedIdAllocationStateMachine::new(storage).unwrap();
    assert_eq!(reloaded.first_unallocated(IdType::Node), 10);
    assert_eq!(reloaded.last_applied_index(), 0);
}
