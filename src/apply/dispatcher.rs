//! Command dispatch
//!
//! Routes core commands to the state machine that owns them.

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::CoreCommand;
use crate::state::{IdAllocationState, ReplicatedIdAllocationStateMachine};

use super::SessionTrackerState;

/// Outcome of applying one command, reported to its proposer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// Whether the proposed range was granted
    IdAllocation { accepted: bool },
}

/// Receives the result of one dispatched command
pub type CommandCallback = Box<dyn FnOnce(CommandResult) + Send>;

/// Applies commands for the duration of one apply batch
pub trait CommandDispatcher {
    fn dispatch(&mut self, command: &CoreCommand, command_index: i64, callback: CommandCallback) -> Result<()>;

    /// End of batch; the dispatcher is not used afterwards
    fn close(&mut self) -> Result<()>;
}

/// The set of state machines driven by the apply pipeline
pub trait StateMachines: Send + Sync {
    /// A dispatcher for one batch of applies
    fn command_dispatcher(&self) -> Box<dyn CommandDispatcher + '_>;

    /// Persist every state machine
    fn flush(&self) -> Result<()>;

    /// Lowest applied command index over all state machines
    fn last_applied(&self) -> i64;

    fn snapshot(&self) -> IdAllocationState;

    fn install_snapshot(&self, state: IdAllocationState);
}

/// Everything needed to bring a lagging member up to `prev_index`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSnapshot {
    /// Last command index covered by the snapshot
    pub prev_index: i64,
    pub id_allocation: IdAllocationState,
    pub sessions: SessionTrackerState,
}

/// The core state machines of a member
pub struct CoreStateMachines {
    id_allocation: Arc<ReplicatedIdAllocationStateMachine>,
}

impl CoreStateMachines {
    pub fn new(id_allocation: Arc<ReplicatedIdAllocationStateMachine>) -> Self {
        Self { id_allocation }
    }

    pub fn id_allocation(&self) -> &Arc<ReplicatedIdAllocationStateMachine> {
        &self.id_allocation
    }
}

impl StateMachines for CoreStateMachines {
    fn command_dispatcher(&self) -> Box<dyn CommandDispatcher + '_> {
        Box::new(CoreDispatcher {
            machines: self,
            dispatched: 0,
        })
    }

    fn flush(&self) -> Result<()> {
        self.id_allocation.flush()
    }

    fn last_applied(&self) -> i64 {
        self.id_allocation.last_applied_index()
    }

    fn snapshot(&self) -> IdAllocationState {
        self.id_allocation.snapshot()
    }

    fn install_snapshot(&self, state: IdAllocationState) {
        self.id_allocation.install_snapshot(state);
    }
}

struct CoreDispatcher<'a> {
    machines: &'a CoreStateMachines,
    dispatched: usize,
}

impl CommandDispatcher for CoreDispatcher<'_> {
    fn dispatch(&mut self, command: &CoreCommand, command_index: i64, callback: CommandCallback) -> Result<()> {
        match command {
            CoreCommand::IdAllocation(request) => {
                self.machines
                    .id_allocation
                    .apply_command(request, command_index, callback);
            }
        }
        self.dispatched += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        tracing::trace!(dispatched = self.dispatched, "Closing command dispatcher");
        Ok(())
    }
}
