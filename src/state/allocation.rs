//! Id allocation ledger

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{IdError, Result};
use crate::id::IdType;

use super::StateMarshal;

/// Per-type high-water marks plus the last applied command index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocationState {
    first_unallocated: [u64; IdType::COUNT],
    applied_command_index: i64,
}

impl Default for IdAllocationState {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocationState {
    pub fn new() -> Self {
        Self {
            first_unallocated: [0; IdType::COUNT],
            applied_command_index: -1,
        }
    }

    pub fn first_unallocated(&self, id_type: IdType) -> u64 {
        self.first_unallocated[id_type as usize]
    }

    pub fn set_first_unallocated(&mut self, id_type: IdType, value: u64) {
        self.first_unallocated[id_type as usize] = value;
    }

    pub fn applied_command_index(&self) -> i64 {
        self.applied_command_index
    }

    pub fn set_applied_command_index(&mut self, index: i64) {
        self.applied_command_index = index;
    }
}

/// Marshal for [`IdAllocationState`]
///
/// Carries no version tag: a different layout needs a new marshal.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdAllocationStateMarshal;

impl StateMarshal<IdAllocationState> for IdAllocationStateMarshal {
    fn start_state(&self) -> IdAllocationState {
        IdAllocationState::new()
    }

    fn marshal(&self, state: &IdAllocationState, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(8 + IdType::COUNT * 8 + 8);
        buf.put_u64(IdType::COUNT as u64);
        for value in state.first_unallocated {
            buf.put_u64(value);
        }
        buf.put_i64(state.applied_command_index);
        Ok(())
    }

    fn unmarshal(&self, buf: &mut Bytes) -> Result<IdAllocationState> {
        if buf.remaining() < 8 {
            return Err(IdError::Corruption(
                "Id allocation state: missing type count".to_string(),
            ));
        }

        let count = buf.get_u64();
        if count != IdType::COUNT as u64 {
            return Err(IdError::Corruption(format!(
                "Id allocation state: {} id types recorded, expected {}",
                count,
                IdType::COUNT
            )));
        }

        let expected = IdType::COUNT * 8 + 8;
        if buf.remaining() != expected {
            return Err(IdError::Corruption(format!(
                "Id allocation state has wrong length: expected {} bytes, got {}",
                expected,
                buf.remaining()
            )));
        }

        let mut state = IdAllocationState::new();
        for slot in state.first_unallocated.iter_mut() {
            *slot = buf.get_u64();
        }
        state.applied_command_index = buf.get_i64();

        Ok(state)
    }
}
