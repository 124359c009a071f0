//! Replicated id allocation state machine
//!
//! Every member runs one of these over the same committed log, so every
//! member reaches the same ledger. A request is accepted only if it starts
//! exactly at the current high-water mark of its id type; of several
//! proposals racing for the same start, the first one in log order wins and
//! the rest are rejected.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::apply::{CommandCallback, CommandResult};
use crate::error::Result;
use crate::id::{IdType, ReplicatedIdAllocationRequest};

use super::{IdAllocationState, StateStorage};

/// State machine handing out non-overlapping id ranges
///
/// Only the apply worker mutates the ledger; any thread may read the current
/// high-water mark or take a snapshot.
pub struct ReplicatedIdAllocationStateMachine {
    storage: Arc<dyn StateStorage<IdAllocationState>>,
    state: RwLock<IdAllocationState>,
}

impl ReplicatedIdAllocationStateMachine {
    /// Load the ledger from `storage` (or start fresh)
    pub fn new(storage: Arc<dyn StateStorage<IdAllocationState>>) -> Result<Self> {
        let state = storage.initial_state()?;
        tracing::debug!(
            applied_command_index = state.applied_command_index(),
            "Loaded id allocation state"
        );
        Ok(Self {
            storage,
            state: RwLock::new(state),
        })
    }

    /// Apply one allocation request at `command_index`
    ///
    /// A command index at or below the last applied one is a replay and is
    /// ignored without invoking the callback.
    pub fn apply_command(
        &self,
        request: &ReplicatedIdAllocationRequest,
        command_index: i64,
        callback: CommandCallback,
    ) {
        let accepted = {
            let mut state = self.state.write();
            if command_index <= state.applied_command_index() {
                tracing::trace!(
                    command_index,
                    applied = state.applied_command_index(),
                    "Ignoring already applied allocation request"
                );
                return;
            }

            state.set_applied_command_index(command_index);

            let first_unallocated = state.first_unallocated(request.id_type);
            let accepted = request.range_start == first_unallocated;
            if accepted {
                state.set_first_unallocated(
                    request.id_type,
                    first_unallocated + u64::from(request.range_length),
                );
            }
            accepted
        };

        tracing::debug!(
            command_index,
            id_type = ?request.id_type,
            range_start = request.range_start,
            range_length = request.range_length,
            owner = %request.owner,
            accepted,
            "Applied id allocation request"
        );

        callback(CommandResult::IdAllocation { accepted });
    }

    /// Current high-water mark for `id_type`
    pub fn first_unallocated(&self, id_type: IdType) -> u64 {
        self.state.read().first_unallocated(id_type)
    }

    /// Persist the current ledger
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot();
        self.storage.persist_store_data(&snapshot)
    }

    pub fn last_applied_index(&self) -> i64 {
        self.state.read().applied_command_index()
    }

    /// Independent copy of the ledger
    pub fn snapshot(&self) -> IdAllocationState {
        self.state.read().clone()
    }

    /// Replace the ledger wholesale
    ///
    /// Callers must know that no newer local state exists.
    pub fn install_snapshot(&self, state: IdAllocationState) {
        tracing::info!(
            applied_command_index = state.applied_command_index(),
            "Installing id allocation snapshot"
        );
        *self.state.write() = state;
    }
}
