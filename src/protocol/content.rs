//! Replicated content definitions
//!
//! Everything the consensus log can carry for the id allocation layer.

use crate::id::ReplicatedIdAllocationRequest;

use super::DistributedOperation;

/// Content tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    Command = 0x01,
    Operation = 0x02,
    NewLeaderBarrier = 0x03,
}

/// Commands understood by the core state machines
///
/// A closed set: every dispatcher matches on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Reserve an id range
    IdAllocation(ReplicatedIdAllocationRequest),
}

/// Content of one log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatedContent {
    /// A bare state machine command
    Command(CoreCommand),

    /// A command tagged with the client operation that proposed it
    Operation(DistributedOperation),

    /// Appended by a new leader; carries no command
    NewLeaderBarrier,
}

impl ReplicatedContent {
    /// Get the content type
    pub fn content_type(&self) -> ContentType {
        match self {
            ReplicatedContent::Command(_) => ContentType::Command,
            ReplicatedContent::Operation(_) => ContentType::Operation,
            ReplicatedContent::NewLeaderBarrier => ContentType::NewLeaderBarrier,
        }
    }
}

impl From<CoreCommand> for ReplicatedContent {
    fn from(command: CoreCommand) -> Self {
        ReplicatedContent::Command(command)
    }
}

impl From<DistributedOperation> for ReplicatedContent {
    fn from(operation: DistributedOperation) -> Self {
        ReplicatedContent::Operation(operation)
    }
}
