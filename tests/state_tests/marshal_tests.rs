//! Tests for state marshals

use bytes::{BufMut, Bytes, BytesMut};
use replicated_ids::apply::{SessionTrackerMarshal, SessionTrackerState};
use replicated_ids::id::IdType;
use replicated_ids::protocol::{GlobalSession, LocalOperationId};
use replicated_ids::state::{IdAllocationState, IdAllocationStateMarshal, LongIndexMarshal, StateMarshal};
use replicated_ids::{IdError, MemberId};

fn marshal<T, M: StateMarshal<T>>(marshal: &M, state: &T) -> Bytes {
    let mut buf = BytesMut::new();
    marshal.marshal(state, &mut buf).unwrap();
    buf.freeze()
}

// =============================================================================
// Id Allocation Ledger
// =============================================================================

#[test]
fn test_ledger_layout() {
    let mut state = IdAllocationState::new();
    state.set_first_unallocated(IdType::Relationship, 2048);
    state.set_applied_command_index(99);

    let bytes = marshal(&IdAllocationStateMarshal, &state);

    assert_eq!(bytes.len(), 8 + IdType::COUNT * 8 + 8);
    assert_eq!(&bytes[0..8], &(IdType::COUNT as u64).to_be_bytes());
    assert_eq!(&bytes[16..24], &2048u64.to_be_bytes());
    assert_eq!(&bytes[bytes.len() - 8..], &99i64.to_be_bytes());

    let mut buf = bytes;
    assert_eq!(IdAllocationStateMarshal.unmarshal(&mut buf).unwrap(), state);
}

#[test]
fn test_ledger_with_fewer_types_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u64(2);
    buf.put_u64(10);
    buf.put_u64(20);
    buf.put_i64(5);

    assert!(matches!(
        IdAllocationStateMarshal.unmarshal(&mut buf.freeze()),
        Err(IdError::Corruption(_))
    ));
}

#[test]
fn test_ledger_with_trailing_bytes_rejected() {
    let bytes = marshal(&IdAllocationStateMarshal, &IdAllocationState::new());
    let mut buf = BytesMut::from(&bytes[..]);
    buf.put_u8(0);

    assert!(matches!(
        IdAllocationStateMarshal.unmarshal(&mut buf.freeze()),
        Err(IdError::Corruption(_))
    ));
}

#[test]
fn test_ledger_rejects_truncated_and_oversized() {
    let bytes = marshal(&IdAllocationStateMarshal, &IdAllocationState::new());
    let mut truncated = bytes.slice(..bytes.len() - 1);
    assert!(matches!(
        IdAllocationStateMarshal.unmarshal(&mut truncated),
        Err(IdError::Corruption(_))
    ));

    let mut buf = BytesMut::new();
    buf.put_u64(IdType::COUNT as u64 + 1);
    assert!(IdAllocationStateMarshal.unmarshal(&mut buf.freeze()).is_err());
}

#[test]
fn test_start_states() {
    assert_eq!(IdAllocationStateMarshal.start_state().applied_command_index(), -1);
    assert_eq!(LongIndexMarshal.start_state(), -1);
    assert_eq!(SessionTrackerMarshal.start_state().log_index(), -1);
}

// =============================================================================
// Long Index / Session Tracker
// =============================================================================

#[test]
fn test_long_index_is_big_endian() {
    let bytes = marshal(&LongIndexMarshal, &258i64);
    assert_eq!(&bytes[..], &258i64.to_be_bytes());
    assert_eq!(LongIndexMarshal.unmarshal(&mut bytes.clone()).unwrap(), 258);
    assert!(LongIndexMarshal.unmarshal(&mut bytes.slice(..4)).is_err());
}

#[test]
fn test_session_tracker_state_survives_marshal() {
    let session = GlobalSession::random(MemberId::random());
    let mut state = SessionTrackerState::default();
    state.update(&session, &LocalOperationId::new(0, 4), 12);

    let mut bytes = marshal(&SessionTrackerMarshal, &state);
    let restored = SessionTrackerMarshal.unmarshal(&mut bytes).unwrap();

    assert_eq!(restored, state);
    assert_eq!(restored.log_index(), 12);
    assert!(!restored.validate_operation(&session, &LocalOperationId::new(0, 4)));
    assert!(restored.validate_operation(&session, &LocalOperationId::new(0, 5)));
}
