//! Configuration for replicated id allocation
//!
//! Centralized configuration with sensible defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IdError, Result};
use crate::id::IdType;

/// Main configuration for one cluster member's id allocation stack
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── raft.log                       (durable replicated log)
    ///     └── state/
    ///           ├── id-allocation.state      (allocation ledger)
    ///           ├── session-tracker.state    (dedup sessions)
    ///           └── last-flushed.state       (last flushed command index)
    pub data_dir: PathBuf,

    /// Sync strategy for the durable log
    pub log_sync_strategy: LogSyncStrategy,

    // -------------------------------------------------------------------------
    // Application Configuration
    // -------------------------------------------------------------------------
    /// Flush state machines every N command indices
    pub flush_every: u64,

    /// Max entries applied under one dispatcher
    pub apply_batch_size: usize,

    // -------------------------------------------------------------------------
    // In-Flight Cache Configuration
    // -------------------------------------------------------------------------
    pub in_flight_cache_enabled: bool,

    pub in_flight_cache_max_entries: usize,

    /// Approximate byte budget of cached content
    pub in_flight_cache_max_bytes: usize,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// How long a proposal may wait to be committed and applied
    pub replication_timeout: Duration,

    /// Range length requested from the cluster, per id type
    pub id_allocation_sizes: HashMap<IdType, u32>,
}

/// Durable log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./replicated_ids_data"),
            log_sync_strategy: LogSyncStrategy::EveryNEntries { count: 64 },
            flush_every: 4096,
            apply_batch_size: 16,
            in_flight_cache_enabled: true,
            in_flight_cache_max_entries: 1024,
            in_flight_cache_max_bytes: 8 * 1024 * 1024, // 8 MB
            replication_timeout: Duration::from_secs(10),
            id_allocation_sizes: default_allocation_sizes(),
        }
    }
}

fn default_allocation_sizes() -> HashMap<IdType, u32> {
    IdType::ALL
        .iter()
        .map(|&id_type| {
            let size = match id_type {
                IdType::NeoStore => 1,
                IdType::PropertyKeyToken
                | IdType::PropertyKeyTokenName
                | IdType::RelationshipTypeToken
                | IdType::RelationshipTypeTokenName
                | IdType::LabelToken
                | IdType::LabelTokenName => 32,
                _ => 1024,
            };
            (id_type, size)
        })
        .collect()
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Range length to request for an id type
    pub fn allocation_size(&self, id_type: IdType) -> u32 {
        self.id_allocation_sizes.get(&id_type).copied().unwrap_or(1024)
    }

    /// Reject settings the apply pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_every == 0 {
            return Err(IdError::Config("flush_every must be at least 1".to_string()));
        }
        if self.apply_batch_size == 0 {
            return Err(IdError::Config("apply_batch_size must be at least 1".to_string()));
        }
        if let Some((id_type, _)) = self.id_allocation_sizes.iter().find(|(_, &size)| size == 0) {
            return Err(IdError::Config(format!(
                "allocation size for {:?} must be at least 1",
                id_type
            )));
        }
        // Range lengths travel as i32 in allocation requests
        if let Some((id_type, size)) = self
            .id_allocation_sizes
            .iter()
            .find(|(_, &size)| size > i32::MAX as u32)
        {
            return Err(IdError::Config(format!(
                "allocation size {} for {:?} exceeds {}",
                size,
                id_type,
                i32::MAX
            )));
        }
        if let LogSyncStrategy::EveryNEntries { count: 0 } = self.log_sync_strategy {
            return Err(IdError::Config("log sync count must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("raft.log")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the durable log sync strategy
    pub fn log_sync_strategy(mut self, strategy: LogSyncStrategy) -> Self {
        self.config.log_sync_strategy = strategy;
        self
    }

    /// Set the flush cadence (in command indices)
    pub fn flush_every(mut self, count: u64) -> Self {
        self.config.flush_every = count;
        self
    }

    /// Set the max number of entries applied per dispatcher
    pub fn apply_batch_size(mut self, size: usize) -> Self {
        self.config.apply_batch_size = size;
        self
    }

    /// Enable or disable the in-flight cache
    pub fn in_flight_cache_enabled(mut self, enabled: bool) -> Self {
        self.config.in_flight_cache_enabled = enabled;
        self
    }

    /// Set the in-flight cache entry limit
    pub fn in_flight_cache_max_entries(mut self, count: usize) -> Self {
        self.config.in_flight_cache_max_entries = count;
        self
    }

    /// Set the in-flight cache byte limit
    pub fn in_flight_cache_max_bytes(mut self, bytes: usize) -> Self {
        self.config.in_flight_cache_max_bytes = bytes;
        self
    }

    /// Set the replication timeout
    pub fn replication_timeout(mut self, timeout: Duration) -> Self {
        self.config.replication_timeout = timeout;
        self
    }

    /// Set the range length requested for one id type
    pub fn allocation_size(mut self, id_type: IdType, size: u32) -> Self {
        self.config.id_allocation_sizes.insert(id_type, size);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
