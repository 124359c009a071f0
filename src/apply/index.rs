//! Applied command index tracking

use std::sync::atomic::{AtomicI64, Ordering};

/// Publishes the highest command index applied so far
///
/// Written by the apply worker, read by anyone.
#[derive(Debug)]
pub struct CommandIndexTracker {
    applied_command_index: AtomicI64,
}

impl Default for CommandIndexTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandIndexTracker {
    pub fn new() -> Self {
        Self {
            applied_command_index: AtomicI64::new(-1),
        }
    }

    pub fn set_applied_command_index(&self, index: i64) {
        self.applied_command_index.store(index, Ordering::Release);
    }

    pub fn applied_command_index(&self) -> i64 {
        self.applied_command_index.load(Ordering::Acquire)
    }
}
