//! Error types for replicated id allocation
//!
//! Provides a unified error type for all operations, plus the narrower
//! `ReplicationError` that describes why a proposal could not reach the
//! cluster.

use std::time::Duration;

use thiserror::Error;

use crate::id::IdRange;

/// Result type alias using IdError
pub type Result<T> = std::result::Result<T, IdError>;

/// Unified error type for replicated id operations
#[derive(Debug, Error)]
pub enum IdError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log / State Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Committed entry {0} is neither cached nor present in the log")]
    MissingEntry(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Application Errors
    // -------------------------------------------------------------------------
    #[error("Command dispatch failed: {0}")]
    Dispatch(String),

    #[error("Process is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Snapshot at index {snapshot_index} is older than applied index {last_applied}")]
    StaleSnapshot { snapshot_index: i64, last_applied: i64 },

    #[error("Command application process already started")]
    AlreadyStarted,

    // -------------------------------------------------------------------------
    // Id Generation Errors
    // -------------------------------------------------------------------------
    #[error("Replication failed: {0}")]
    Replication(#[from] ReplicationError),

    #[error(
        "Id allocation state is probably corrupted or out of sync with the cluster. \
         Local highId is {high_id} and allocation range is {range}"
    )]
    CorruptedRange { high_id: u64, range: IdRange },

    #[error("Id generator is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reasons a proposal could not be replicated
///
/// These are infrastructure failures. Losing an allocation race is not one of
/// them: a rejected proposal comes back as a normal command result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("this member is not the leader")]
    NotLeader,

    #[error("no leader is currently known")]
    NoLeader,

    #[error("timed out after {0:?} waiting for the command to be applied")]
    Timeout(Duration),

    #[error("consensus unavailable: {0}")]
    Unavailable(String),
}

impl From<bincode::Error> for IdError {
    fn from(err: bincode::Error) -> Self {
        IdError::Serialization(err.to_string())
    }
}
