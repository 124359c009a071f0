//! Command application process
//!
//! A single worker thread applies committed entries strictly in log order.
//!
//! ## Per Entry
//! 1. Fetch the entry (cache, then log; absent from both is fatal)
//! 2. Advance the command index, even for barriers and duplicates
//! 3. Dispatch the command unless it replays an applied operation; a replay
//!    only releases whoever waits on it
//! 4. Flush every `flush_every` command indices
//!
//! Any error stops the worker for good and marks the process unhealthy.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::error::{IdError, Result};
use crate::log::RaftLog;
use crate::protocol::ReplicatedContent;
use crate::replication::ProgressTracker;
use crate::state::StateStorage;

use super::{
    CommandDispatcher, CommandIndexTracker, CoreSnapshot, Health, InFlightCache, SessionTracker, StateMachines,
};

/// Something that wants to hear about commit index advances
pub trait CommitListener: Send + Sync {
    fn notify_committed(&self, commit_index: i64);
}

/// Snapshot of the applier's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplierStatus {
    /// Highest log index applied
    pub last_applied: i64,

    /// Highest command index assigned (advances in lock-step with `last_applied`)
    pub command_index: i64,

    /// Command index of the last flush
    pub last_flushed: i64,

    /// Highest commit index seen
    pub commit_index: i64,
}

enum ApplierMessage {
    Committed(i64),
    Shutdown,
}

/// Applies the committed log to the state machines
pub struct CommandApplicationProcess {
    shared: Arc<Shared>,
    sender: Sender<ApplierMessage>,
    receiver: Mutex<Option<Receiver<ApplierMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    log: Arc<dyn RaftLog>,
    cache: Arc<InFlightCache>,
    state_machines: Arc<dyn StateMachines>,
    sessions: Mutex<SessionTracker>,
    last_flushed_storage: Arc<dyn StateStorage<i64>>,
    progress: Arc<ProgressTracker>,
    command_index_tracker: Arc<CommandIndexTracker>,
    health: Arc<Health>,
    flush_every: i64,
    batch_size: i64,

    /// Held by the worker for a whole apply run
    applier: Mutex<ApplierStatus>,

    /// Readable without waiting for a running batch
    last_applied: AtomicI64,

    applied_lock: Mutex<()>,
    applied_changed: Condvar,
}

impl CommandApplicationProcess {
    pub fn new(
        log: Arc<dyn RaftLog>,
        cache: Arc<InFlightCache>,
        state_machines: Arc<dyn StateMachines>,
        sessions: SessionTracker,
        last_flushed_storage: Arc<dyn StateStorage<i64>>,
        config: &Config,
    ) -> Self {
        let (sender, receiver) = channel::unbounded();
        let initial = ApplierStatus {
            last_applied: -1,
            command_index: -1,
            last_flushed: -1,
            commit_index: -1,
        };

        let shared = Shared {
            log,
            cache,
            state_machines,
            sessions: Mutex::new(sessions),
            last_flushed_storage,
            progress: Arc::new(ProgressTracker::new()),
            command_index_tracker: Arc::new(CommandIndexTracker::new()),
            health: Arc::new(Health::new()),
            flush_every: config.flush_every.max(1) as i64,
            batch_size: config.apply_batch_size.max(1) as i64,
            applier: Mutex::new(initial),
            last_applied: AtomicI64::new(-1),
            applied_lock: Mutex::new(()),
            applied_changed: Condvar::new(),
        };

        Self {
            shared: Arc::new(shared),
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// Recover bookkeeping from the last flush and start the worker
    ///
    /// Entries after the last flush are re-applied once the consensus layer
    /// reports its commit index; the state machines ignore what they have
    /// already seen.
    pub fn start(&self) -> Result<()> {
        let receiver = self.receiver.lock().take().ok_or(IdError::AlreadyStarted)?;

        let last_flushed = self.shared.last_flushed_storage.initial_state()?;
        {
            let mut status = self.shared.applier.lock();
            status.last_applied = last_flushed;
            status.command_index = last_flushed;
            status.last_flushed = last_flushed;
            status.commit_index = status.commit_index.max(last_flushed);
        }
        self.shared.last_applied.store(last_flushed, Ordering::Release);
        self.shared.command_index_tracker.set_applied_command_index(last_flushed);

        tracing::info!(
            last_flushed,
            state_machines_applied = self.shared.state_machines.last_applied(),
            "Starting command application process"
        );

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("command-applier".to_string())
            .spawn(move || shared.run(receiver))?;
        *self.worker.lock() = Some(handle);

        Ok(())
    }

    /// Report that the log is committed up to `commit_index`
    pub fn notify_committed(&self, commit_index: i64) -> Result<()> {
        self.shared.health.assert_healthy()?;
        self.sender
            .send(ApplierMessage::Committed(commit_index))
            .map_err(|_| IdError::Unhealthy("command applier has stopped".to_string()))
    }

    /// Highest log index applied
    pub fn last_applied(&self) -> i64 {
        self.shared.last_applied.load(Ordering::Acquire)
    }

    /// Block until `index` is applied
    ///
    /// Returns `Ok(false)` on timeout and an error once the process is
    /// unhealthy.
    pub fn await_applied(&self, index: i64, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.applied_lock.lock();
        loop {
            self.shared.health.assert_healthy()?;
            if self.last_applied() >= index {
                return Ok(true);
            }
            if self
                .shared
                .applied_changed
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                self.shared.health.assert_healthy()?;
                return Ok(self.last_applied() >= index);
            }
        }
    }

    /// Consistent view of the applier's bookkeeping
    pub fn status(&self) -> ApplierStatus {
        *self.shared.applier.lock()
    }

    /// Capture state machine and session state at the current applied index
    pub fn snapshot(&self) -> CoreSnapshot {
        let status = self.shared.applier.lock();
        CoreSnapshot {
            prev_index: status.command_index,
            id_allocation: self.shared.state_machines.snapshot(),
            sessions: self.shared.sessions.lock().snapshot(),
        }
    }

    /// Replace all state with `snapshot` and continue after its index
    ///
    /// Refused if this member has already applied past the snapshot.
    pub fn install_snapshot(&self, snapshot: CoreSnapshot) -> Result<()> {
        self.shared.health.assert_healthy()?;
        let mut status = self.shared.applier.lock();

        if snapshot.prev_index < status.last_applied {
            return Err(IdError::StaleSnapshot {
                snapshot_index: snapshot.prev_index,
                last_applied: status.last_applied,
            });
        }

        tracing::info!(prev_index = snapshot.prev_index, "Installing core snapshot");

        let prev_index = snapshot.prev_index;
        self.shared.state_machines.install_snapshot(snapshot.id_allocation);
        self.shared.sessions.lock().install_snapshot(snapshot.sessions);

        status.last_applied = prev_index;
        status.command_index = prev_index;
        status.commit_index = status.commit_index.max(prev_index);
        self.shared.last_applied.store(prev_index, Ordering::Release);
        self.shared.command_index_tracker.set_applied_command_index(prev_index);
        self.shared.cache.prune(prev_index);

        self.shared.flush(&mut status)?;
        drop(status);
        self.shared.signal_applied();
        Ok(())
    }

    /// Stop the worker, flushing if healthy
    pub fn stop(&self) -> Result<()> {
        let _ = self.sender.send(ApplierMessage::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                return Err(IdError::Unhealthy("command applier thread panicked".to_string()));
            }
        }
        Ok(())
    }

    pub fn health(&self) -> &Arc<Health> {
        &self.shared.health
    }

    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.shared.progress
    }

    pub fn command_index_tracker(&self) -> &Arc<CommandIndexTracker> {
        &self.shared.command_index_tracker
    }
}

impl CommitListener for CommandApplicationProcess {
    fn notify_committed(&self, commit_index: i64) {
        if let Err(e) = CommandApplicationProcess::notify_committed(self, commit_index) {
            tracing::debug!(commit_index, error = %e, "Ignoring commit notification");
        }
    }
}

impl Drop for CommandApplicationProcess {
    fn drop(&mut self) {
        let _ = self.sender.send(ApplierMessage::Shutdown);
    }
}

impl Shared {
    fn run(&self, receiver: Receiver<ApplierMessage>) {
        while let Ok(message) = receiver.recv() {
            let mut target = match message {
                ApplierMessage::Committed(index) => index,
                ApplierMessage::Shutdown => break,
            };

            // Coalesce notifications that piled up meanwhile
            let mut shutdown = false;
            for message in receiver.try_iter() {
                match message {
                    ApplierMessage::Committed(index) => target = target.max(index),
                    ApplierMessage::Shutdown => {
                        shutdown = true;
                        break;
                    }
                }
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.apply_up_to(target)))
                .unwrap_or_else(|cause| Err(IdError::Dispatch(panic_message(cause.as_ref()))));

            if let Err(e) = outcome {
                self.fail(&e);
                return;
            }
            if shutdown {
                break;
            }
        }

        if self.health.is_healthy() {
            let mut status = self.applier.lock();
            if let Err(e) = self.flush(&mut status) {
                tracing::error!(error = %e, "Final flush failed");
            }
        }
        tracing::debug!("Command applier stopped");
    }

    fn apply_up_to(&self, commit_index: i64) -> Result<()> {
        let mut status = self.applier.lock();
        status.commit_index = status.commit_index.max(commit_index);

        while status.last_applied < status.commit_index {
            let batch_end = status.commit_index.min(status.last_applied + self.batch_size);
            let first = status.last_applied + 1;

            let mut dispatcher = self.state_machines.command_dispatcher();
            let mut result = Ok(());
            for index in first..=batch_end {
                result = self.apply_entry(&mut status, dispatcher.as_mut(), index);
                if result.is_err() {
                    break;
                }
            }
            let closed = dispatcher.close();
            drop(dispatcher);
            result?;
            closed?;

            self.cache.prune(status.last_applied);
            tracing::debug!(
                from = first,
                to = status.last_applied,
                commit_index = status.commit_index,
                "Applied batch"
            );
            self.signal_applied();
        }

        Ok(())
    }

    fn apply_entry(
        &self,
        status: &mut ApplierStatus,
        dispatcher: &mut (dyn CommandDispatcher + '_),
        index: i64,
    ) -> Result<()> {
        let entry = match self.cache.get(index) {
            Some(entry) => entry,
            None => self.log.read_entry(index)?.ok_or(IdError::MissingEntry(index))?,
        };

        let command_index = status.command_index + 1;

        match entry.content {
            ReplicatedContent::NewLeaderBarrier => {
                tracing::trace!(index, term = entry.term, "Applying new leader barrier");
            }
            ReplicatedContent::Command(command) => {
                dispatcher.dispatch(&command, command_index, Box::new(|_| {}))?;
            }
            ReplicatedContent::Operation(operation) => {
                let mut sessions = self.sessions.lock();
                if sessions.validate_operation(&operation.global_session, &operation.operation_id) {
                    sessions.update(&operation.global_session, &operation.operation_id, index);
                    drop(sessions);

                    let progress = Arc::clone(&self.progress);
                    let key = operation.key();
                    dispatcher.dispatch(
                        &operation.command,
                        command_index,
                        Box::new(move |result| progress.track_result(key, result)),
                    )?;
                } else {
                    drop(sessions);
                    tracing::debug!(
                        index,
                        owner = %operation.global_session.owner,
                        local_session_id = operation.operation_id.local_session_id,
                        sequence_number = operation.operation_id.sequence_number,
                        "Skipping duplicate operation"
                    );
                    // The original outcome is not kept; release a retransmitting proposer
                    self.progress.abort(&operation.key());
                }
            }
        }

        status.command_index = command_index;
        status.last_applied = index;
        self.last_applied.store(index, Ordering::Release);
        self.command_index_tracker.set_applied_command_index(command_index);

        if status.command_index - status.last_flushed >= self.flush_every {
            self.flush(status)?;
        }

        Ok(())
    }

    /// Flush state machines and sessions, then record the flushed index
    fn flush(&self, status: &mut ApplierStatus) -> Result<()> {
        self.state_machines.flush()?;
        self.sessions.lock().flush()?;
        self.last_flushed_storage.persist_store_data(&status.command_index)?;
        status.last_flushed = status.command_index;
        tracing::debug!(last_flushed = status.last_flushed, "Flushed state machines");
        Ok(())
    }

    fn fail(&self, cause: &IdError) {
        self.health.panic(cause);
        self.progress.abort_all();
        self.signal_applied();
    }

    fn signal_applied(&self) {
        let _guard = self.applied_lock.lock();
        self.applied_changed.notify_all();
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        format!("state machine panicked: {}", message)
    } else if let Some(message) = cause.downcast_ref::<String>() {
        format!("state machine panicked: {}", message)
    } else {
        "state machine panicked".to_string()
    }
}
