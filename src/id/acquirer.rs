//! Range acquisition
//!
//! Proposes `[first_unallocated, first_unallocated + size)` and retries when
//! another member's proposal for the same start wins. Losing that race is
//! routine; failing to replicate at all is not and goes back to the caller.

use std::sync::Arc;

use crate::apply::CommandResult;
use crate::config::Config;
use crate::error::Result;
use crate::identity::MemberId;
use crate::protocol::CoreCommand;
use crate::replication::Replicator;
use crate::state::ReplicatedIdAllocationStateMachine;

use super::{IdAllocation, IdRange, IdType, ReplicatedIdAllocationRequest};

/// Source of fresh id ranges
pub trait IdRangeAcquirer: Send + Sync {
    fn acquire_ids(&self, id_type: IdType) -> Result<IdAllocation>;
}

/// Acquires ranges through the replicated allocation state machine
pub struct ReplicatedIdRangeAcquirer {
    me: MemberId,
    replicator: Arc<dyn Replicator>,
    state_machine: Arc<ReplicatedIdAllocationStateMachine>,
    allocation_sizes: [u32; IdType::COUNT],
}

impl ReplicatedIdRangeAcquirer {
    pub fn new(
        me: MemberId,
        replicator: Arc<dyn Replicator>,
        state_machine: Arc<ReplicatedIdAllocationStateMachine>,
        config: &Config,
    ) -> Self {
        let mut allocation_sizes = [0; IdType::COUNT];
        for id_type in IdType::ALL {
            allocation_sizes[id_type.ordinal() as usize] = config.allocation_size(id_type);
        }

        Self {
            me,
            replicator,
            state_machine,
            allocation_sizes,
        }
    }

    pub fn allocation_size(&self, id_type: IdType) -> u32 {
        self.allocation_sizes[id_type.ordinal() as usize]
    }
}

impl IdRangeAcquirer for ReplicatedIdRangeAcquirer {
    fn acquire_ids(&self, id_type: IdType) -> Result<IdAllocation> {
        let range_length = self.allocation_size(id_type);
        let mut attempt = 0u64;

        loop {
            attempt += 1;
            let range_start = self.state_machine.first_unallocated(id_type);
            let request = ReplicatedIdAllocationRequest::new(self.me, id_type, range_start, range_length);

            match self.replicator.replicate(CoreCommand::IdAllocation(request))? {
                CommandResult::IdAllocation { accepted: true } => {
                    tracing::info!(
                        id_type = ?id_type,
                        range_start,
                        range_length,
                        attempt,
                        "Acquired id range from the cluster"
                    );
                    return Ok(IdAllocation::new(
                        IdRange::contiguous(range_start, range_length),
                        range_start as i64 - 1,
                        0,
                    ));
                }
                CommandResult::IdAllocation { accepted: false } => {
                    tracing::warn!(
                        id_type = ?id_type,
                        range_start,
                        attempt,
                        "Id range proposal lost to a concurrent allocation, retrying"
                    );
                }
            }
        }
    }
}
