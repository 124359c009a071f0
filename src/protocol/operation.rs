//! Distributed operations
//!
//! A command wrapped with the identity of the client operation that proposed
//! it. The identity, not the command, decides whether two entries are the
//! same operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::MemberId;

use super::CoreCommand;

/// A session opened by one member for the lifetime of its replicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalSession {
    pub session_id: Uuid,
    pub owner: MemberId,
}

impl GlobalSession {
    pub fn new(session_id: Uuid, owner: MemberId) -> Self {
        Self { session_id, owner }
    }

    /// A fresh session for `owner`
    pub fn random(owner: MemberId) -> Self {
        Self::new(Uuid::new_v4(), owner)
    }
}

/// Identity of one operation within a global session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalOperationId {
    /// Local session within the global session (one per concurrent caller)
    pub local_session_id: u64,

    /// Increases by one per operation in the local session
    pub sequence_number: u64,
}

impl LocalOperationId {
    pub fn new(local_session_id: u64, sequence_number: u64) -> Self {
        Self {
            local_session_id,
            sequence_number,
        }
    }
}

/// A command plus the operation identity used for deduplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedOperation {
    pub command: CoreCommand,
    pub global_session: GlobalSession,
    pub operation_id: LocalOperationId,
}

impl DistributedOperation {
    pub fn new(command: CoreCommand, global_session: GlobalSession, operation_id: LocalOperationId) -> Self {
        Self {
            command,
            global_session,
            operation_id,
        }
    }

    /// Key under which proposers wait for this operation's result
    pub fn key(&self) -> (GlobalSession, LocalOperationId) {
        (self.global_session, self.operation_id)
    }
}
