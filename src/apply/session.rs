//! Operation deduplication
//!
//! A proposer may retransmit an operation (after a timeout, or to a new
//! leader), so the same operation can be committed more than once. Every
//! member remembers, per owner and local session, the highest sequence number
//! it applied; anything at or below it is a replay.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::identity::MemberId;
use crate::protocol::{GlobalSession, LocalOperationId};
use crate::state::{StateMarshal, StateStorage};

/// Sessions of one owner under its current global session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OwnerSessions {
    global_session_id: Uuid,

    /// Highest applied sequence number per local session
    last_sequence_numbers: HashMap<u64, u64>,
}

impl OwnerSessions {
    fn new(global_session_id: Uuid) -> Self {
        Self {
            global_session_id,
            last_sequence_numbers: HashMap::new(),
        }
    }
}

/// Everything the tracker persists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTrackerState {
    owners: HashMap<MemberId, OwnerSessions>,

    /// Log index of the last update, -1 if none
    log_index: i64,
}

impl Default for SessionTrackerState {
    fn default() -> Self {
        Self {
            owners: HashMap::new(),
            log_index: -1,
        }
    }
}

impl SessionTrackerState {
    pub fn log_index(&self) -> i64 {
        self.log_index
    }

    /// Whether `operation_id` in `session` has not been applied yet
    pub fn validate_operation(&self, session: &GlobalSession, operation_id: &LocalOperationId) -> bool {
        let owner = match self.owners.get(&session.owner) {
            Some(owner) if owner.global_session_id == session.session_id => owner,
            // Unknown owner, or the owner restarted under a new global session
            _ => return true,
        };

        match owner.last_sequence_numbers.get(&operation_id.local_session_id) {
            Some(&last) => operation_id.sequence_number > last,
            None => true,
        }
    }

    /// Record `operation_id` as applied at `log_index`
    ///
    /// Updates at or below the last recorded log index are replays and are
    /// ignored.
    pub fn update(&mut self, session: &GlobalSession, operation_id: &LocalOperationId, log_index: i64) {
        if log_index <= self.log_index {
            return;
        }

        let owner = self
            .owners
            .entry(session.owner)
            .or_insert_with(|| OwnerSessions::new(session.session_id));
        if owner.global_session_id != session.session_id {
            tracing::debug!(owner = %session.owner, "New global session, resetting owner's sequence numbers");
            *owner = OwnerSessions::new(session.session_id);
        }

        let last = owner
            .last_sequence_numbers
            .entry(operation_id.local_session_id)
            .or_insert(operation_id.sequence_number);
        if operation_id.sequence_number > last.saturating_add(1) {
            tracing::warn!(
                owner = %session.owner,
                local_session_id = operation_id.local_session_id,
                last = *last,
                sequence_number = operation_id.sequence_number,
                "Gap in operation sequence numbers"
            );
        }
        *last = (*last).max(operation_id.sequence_number);

        self.log_index = log_index;
    }
}

/// Dedup tracker with durable state
pub struct SessionTracker {
    storage: Arc<dyn StateStorage<SessionTrackerState>>,
    state: SessionTrackerState,
}

impl SessionTracker {
    pub fn new(storage: Arc<dyn StateStorage<SessionTrackerState>>) -> Result<Self> {
        let state = storage.initial_state()?;
        Ok(Self { storage, state })
    }

    pub fn validate_operation(&self, session: &GlobalSession, operation_id: &LocalOperationId) -> bool {
        self.state.validate_operation(session, operation_id)
    }

    pub fn update(&mut self, session: &GlobalSession, operation_id: &LocalOperationId, log_index: i64) {
        self.state.update(session, operation_id, log_index);
    }

    pub fn last_applied_index(&self) -> i64 {
        self.state.log_index
    }

    pub fn flush(&self) -> Result<()> {
        self.storage.persist_store_data(&self.state)
    }

    pub fn snapshot(&self) -> SessionTrackerState {
        self.state.clone()
    }

    pub fn install_snapshot(&mut self, state: SessionTrackerState) {
        self.state = state;
    }
}

/// Length-prefixed bincode encoding of [`SessionTrackerState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionTrackerMarshal;

impl StateMarshal<SessionTrackerState> for SessionTrackerMarshal {
    fn start_state(&self) -> SessionTrackerState {
        SessionTrackerState::default()
    }

    fn marshal(&self, state: &SessionTrackerState, buf: &mut BytesMut) -> Result<()> {
        let encoded = bincode::serialize(state)?;
        buf.put_u32(encoded.len() as u32);
        buf.put_slice(&encoded);
        Ok(())
    }

    fn unmarshal(&self, buf: &mut Bytes) -> Result<SessionTrackerState> {
        if buf.remaining() < 4 {
            return Err(crate::IdError::Corruption(
                "Session tracker state: missing length".to_string(),
            ));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(crate::IdError::Corruption(format!(
                "Session tracker state truncated: expected {} bytes, got {}",
                len,
                buf.remaining()
            )));
        }
        let encoded = buf.split_to(len);
        Ok(bincode::deserialize(&encoded)?)
    }
}
