//! Tests for the id allocation state machine and state storage

mod machine_tests;
mod marshal_tests;

use std::sync::Arc;

use parking_lot::Mutex;
use replicated_ids::apply::{CommandCallback, CommandResult};
use replicated_ids::state::{IdAllocationState, InMemoryStateStorage, ReplicatedIdAllocationStateMachine};

// =============================================================================
// Shared Helpers
// =============================================================================

/// Results reported through callbacks, in order
#[derive(Clone, Default)]
pub struct Recorder {
    results: Arc<Mutex<Vec<CommandResult>>>,
}

impl Recorder {
    pub fn callback(&self) -> CommandCallback {
        let results = Arc::clone(&self.results);
        Box::new(move |result| results.lock().push(result))
    }

    pub fn results(&self) -> Vec<CommandResult> {
        self.results.lock().clone()
    }
}

pub fn fresh_machine() -> ReplicatedIdAllocationStateMachine {
    ReplicatedIdAllocationStateMachine::new(Arc::new(InMemoryStateStorage::new(IdAllocationState::new())))
        .unwrap()
}
