//! Reuse-gated id generator

use std::sync::Arc;

use crate::error::Result;

use super::{IdGenerator, IdRange, ReuseGate};

/// Drops `free_id` calls while the gate says reuse is unsafe
///
/// Dropped frees are not reported to the caller; the id is simply not
/// reused.
pub struct FreeIdFilteredIdGenerator {
    delegate: Arc<dyn IdGenerator>,
    gate: Arc<dyn ReuseGate>,
}

impl FreeIdFilteredIdGenerator {
    pub fn new(delegate: Arc<dyn IdGenerator>, gate: Arc<dyn ReuseGate>) -> Self {
        Self { delegate, gate }
    }
}

impl IdGenerator for FreeIdFilteredIdGenerator {
    fn next_id(&self) -> Result<u64> {
        self.delegate.next_id()
    }

    fn next_id_batch(&self, size: usize) -> Result<IdRange> {
        self.delegate.next_id_batch(size)
    }

    fn free_id(&self, id: u64) {
        if self.gate.is_reuse_safe() {
            self.delegate.free_id(id);
        } else {
            tracing::trace!(id, "Id reuse unsafe, dropping free");
        }
    }

    fn high_id(&self) -> u64 {
        self.delegate.high_id()
    }

    fn set_high_id(&self, high_id: u64) {
        self.delegate.set_high_id(high_id);
    }

    fn highest_possible_id_in_use(&self) -> i64 {
        self.delegate.highest_possible_id_in_use()
    }

    fn number_of_ids_in_use(&self) -> u64 {
        self.delegate.number_of_ids_in_use()
    }

    fn defrag_count(&self) -> u64 {
        self.delegate.defrag_count()
    }

    fn close(&self) {
        self.delegate.close();
    }

    fn delete(&self) {
        self.delegate.delete();
    }
}
