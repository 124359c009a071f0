//! Process health
//!
//! Once panicked, a process stays unhealthy. Only the first cause is kept.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{IdError, Result};

#[derive(Debug, Default)]
pub struct Health {
    panicked: AtomicBool,
    cause: Mutex<Option<String>>,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process unhealthy for good
    pub fn panic(&self, cause: &IdError) {
        let mut recorded = self.cause.lock();
        if recorded.is_none() {
            tracing::error!(error = %cause, "Process panicked; no further commands will be applied");
            *recorded = Some(cause.to_string());
        }
        self.panicked.store(true, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        !self.panicked.load(Ordering::Acquire)
    }

    /// The first recorded cause, if any
    pub fn cause(&self) -> Option<String> {
        self.cause.lock().clone()
    }

    pub fn assert_healthy(&self) -> Result<()> {
        if self.is_healthy() {
            return Ok(());
        }
        Err(IdError::Unhealthy(
            self.cause().unwrap_or_else(|| "unknown cause".to_string()),
        ))
    }
}
