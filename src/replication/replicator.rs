//! Replicator
//!
//! Proposes a command and blocks until it has been committed and applied on
//! this member, returning the state machine's result.

use std::sync::Arc;
use std::time::Duration;

use crate::apply::{CommandResult, Health};
use crate::error::ReplicationError;
use crate::identity::MemberId;
use crate::protocol::{CoreCommand, DistributedOperation};

use super::{ConsensusModule, LocalSessionPool, ProgressTracker};

/// Replicates commands through the cluster
pub trait Replicator: Send + Sync {
    /// Propose `command` and wait for its result
    ///
    /// An error means the command could not be replicated in time; it may
    /// still be applied later.
    fn replicate(&self, command: CoreCommand) -> Result<CommandResult, ReplicationError>;
}

/// Replicator on top of a [`ConsensusModule`]
pub struct RaftReplicator {
    consensus: Arc<dyn ConsensusModule>,
    progress: Arc<ProgressTracker>,
    health: Arc<Health>,
    pool: LocalSessionPool,
    timeout: Duration,
}

impl RaftReplicator {
    pub fn new(
        me: MemberId,
        consensus: Arc<dyn ConsensusModule>,
        progress: Arc<ProgressTracker>,
        health: Arc<Health>,
        timeout: Duration,
    ) -> Self {
        Self {
            consensus,
            progress,
            health,
            pool: LocalSessionPool::new(me),
            timeout,
        }
    }

    pub fn session_pool(&self) -> &LocalSessionPool {
        &self.pool
    }
}

impl Replicator for RaftReplicator {
    fn replicate(&self, command: CoreCommand) -> Result<CommandResult, ReplicationError> {
        if !self.health.is_healthy() {
            return Err(ReplicationError::Unavailable(
                "local member is unhealthy".to_string(),
            ));
        }
        if self.consensus.leader().is_none() {
            return Err(ReplicationError::NoLeader);
        }

        let mut context = self.pool.acquire();
        let operation =
            DistributedOperation::new(command, self.pool.global_session(), context.next_operation_id());
        let key = operation.key();
        let progress = self.progress.start(&operation);

        let outcome = self
            .consensus
            .propose(operation.into())
            .and_then(|()| progress.await_result(self.timeout));

        if let Err(e) = &outcome {
            tracing::warn!(
                local_session_id = context.local_session_id(),
                error = %e,
                "Replication failed"
            );
            self.progress.abort(&key);
        }
        self.pool.release(context);

        outcome
    }
}
