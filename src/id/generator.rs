//! Local id generator
//!
//! Serves ids out of ranges granted by the cluster. Calls are serialized per
//! generator: when the current range runs out, the caller that noticed blocks
//! on one acquisition while the others queue behind it.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{IdError, Result};

use super::{IdRange, IdRangeAcquirer, IdRangeIterator, IdType};

/// Conventional id generator interface used by the record stores
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<u64>;

    /// Up to `size` ids; fewer when the current range runs out
    fn next_id_batch(&self, size: usize) -> Result<IdRange>;

    /// Make `id` available for reuse
    fn free_id(&self, id: u64);

    /// One past the highest id ever handed out
    fn high_id(&self) -> u64;

    /// Raise the high id; lowering is ignored
    fn set_high_id(&self, high_id: u64);

    fn highest_possible_id_in_use(&self) -> i64;

    fn number_of_ids_in_use(&self) -> u64;

    /// Number of freed ids waiting for reuse
    fn defrag_count(&self) -> u64;

    fn close(&self);

    /// Close and forget every freed id
    fn delete(&self);
}

/// Clip `range` so that none of its contiguous ids lies below `high_id`
///
/// A range that clips to nothing means the local high id ran past what the
/// cluster considers unallocated, which only happens when local state and the
/// ledger disagree.
pub fn respecting_high_id(range: &IdRange, high_id: u64) -> Result<IdRange> {
    let range_start = range.range_start.max(high_id);
    let range_end = range.range_end();
    if range_end <= range_start {
        return Err(IdError::CorruptedRange {
            high_id,
            range: range.clone(),
        });
    }

    Ok(IdRange::new(
        range.defrag_ids.clone(),
        range_start,
        (range_end - range_start) as u32,
    ))
}

/// Id generator backed by cluster-wide range allocation
pub struct ReplicatedIdGenerator {
    id_type: IdType,
    acquirer: Arc<dyn IdRangeAcquirer>,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    high_id: u64,
    queue: IdRangeIterator,
    reusable: BTreeSet<u64>,
    closed: bool,
}

impl ReplicatedIdGenerator {
    pub fn new(id_type: IdType, high_id: u64, acquirer: Arc<dyn IdRangeAcquirer>) -> Self {
        Self {
            id_type,
            acquirer,
            state: Mutex::new(GeneratorState {
                high_id,
                queue: IdRangeIterator::empty(),
                reusable: BTreeSet::new(),
                closed: false,
            }),
        }
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    /// Ids left in the current range
    pub fn remaining_in_range(&self) -> usize {
        self.state.lock().queue.remaining()
    }

    fn refill(&self, state: &mut GeneratorState) -> Result<()> {
        let allocation = self.acquirer.acquire_ids(self.id_type)?;

        let range = match respecting_high_id(&allocation.id_range, state.high_id) {
            Ok(range) => range,
            Err(e) => {
                tracing::error!(
                    id_type = ?self.id_type,
                    high_id = state.high_id,
                    range = %allocation.id_range,
                    "Acquired id range lies entirely below the local high id"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            id_type = ?self.id_type,
            range = %range,
            highest_id_in_use = allocation.highest_id_in_use,
            "Acquired id range"
        );
        state.queue = IdRangeIterator::new(range);
        Ok(())
    }
}

impl GeneratorState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(IdError::Closed);
        }
        Ok(())
    }

    fn mark_used(&mut self, id: u64) {
        self.high_id = self.high_id.max(id + 1);
    }
}

impl IdGenerator for ReplicatedIdGenerator {
    fn next_id(&self) -> Result<u64> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if let Some(id) = state.reusable.pop_first() {
            return Ok(id);
        }

        loop {
            if let Some(id) = state.queue.next_id() {
                state.mark_used(id);
                return Ok(id);
            }
            self.refill(&mut state)?;
        }
    }

    fn next_id_batch(&self, size: usize) -> Result<IdRange> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if size == 0 {
            return Ok(IdRange::EMPTY);
        }

        if state.queue.is_exhausted() {
            self.refill(&mut state)?;
        }
        let batch = state.queue.next_id_batch(size);
        if let Some(highest) = batch.highest_id() {
            state.mark_used(highest);
        }
        Ok(batch)
    }

    fn free_id(&self, id: u64) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if id >= state.high_id {
            tracing::warn!(id_type = ?self.id_type, id, high_id = state.high_id, "Ignoring free of id never handed out");
            return;
        }
        state.reusable.insert(id);
    }

    fn high_id(&self) -> u64 {
        self.state.lock().high_id
    }

    fn set_high_id(&self, high_id: u64) {
        let mut state = self.state.lock();
        if high_id > state.high_id {
            state.high_id = high_id;
            state.queue.skip_below(high_id);
        }
    }

    fn highest_possible_id_in_use(&self) -> i64 {
        self.state.lock().high_id as i64 - 1
    }

    fn number_of_ids_in_use(&self) -> u64 {
        let state = self.state.lock();
        state.high_id.saturating_sub(state.reusable.len() as u64)
    }

    fn defrag_count(&self) -> u64 {
        self.state.lock().reusable.len() as u64
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue = IdRangeIterator::empty();
    }

    fn delete(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue = IdRangeIterator::empty();
        state.reusable.clear();
    }
}
