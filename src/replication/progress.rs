//! Progress tracking for proposed operations
//!
//! A proposer registers its operation before proposing it and then blocks on
//! the returned [`Progress`]. The apply pipeline reports the operation's
//! result here once the operation is applied locally.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::apply::CommandResult;
use crate::error::ReplicationError;
use crate::protocol::{DistributedOperation, GlobalSession, LocalOperationId};

type OperationKey = (GlobalSession, LocalOperationId);

/// Waiters for operations that are proposed but not yet applied
#[derive(Default)]
pub struct ProgressTracker {
    waiters: Mutex<HashMap<OperationKey, Sender<CommandResult>>>,
}

/// Handle a proposer blocks on
pub struct Progress {
    key: OperationKey,
    receiver: Receiver<CommandResult>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `operation` before proposing it
    pub fn start(&self, operation: &DistributedOperation) -> Progress {
        let (sender, receiver) = channel::bounded(1);
        let key = operation.key();
        self.waiters.lock().insert(key, sender);
        Progress { key, receiver }
    }

    /// Deliver the result of an applied operation
    ///
    /// Results for operations nobody waits on (proposed by another member,
    /// or abandoned after a timeout) are dropped.
    pub fn track_result(&self, key: OperationKey, result: CommandResult) {
        if let Some(sender) = self.waiters.lock().remove(&key) {
            // The waiter may have given up already
            let _ = sender.try_send(result);
        }
    }

    /// Stop tracking one operation
    pub fn abort(&self, key: &OperationKey) {
        self.waiters.lock().remove(key);
    }

    /// Fail every waiter
    pub fn abort_all(&self) {
        let mut waiters = self.waiters.lock();
        if !waiters.is_empty() {
            tracing::debug!(count = waiters.len(), "Aborting in-progress operations");
        }
        waiters.clear();
    }

    /// Number of operations still awaiting a result
    pub fn in_progress_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Progress {
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Block until the result arrives or `timeout` elapses
    pub fn await_result(&self, timeout: Duration) -> Result<CommandResult, ReplicationError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(ReplicationError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReplicationError::Unavailable(
                "operation aborted without a result".to_string(),
            )),
        }
    }
}
