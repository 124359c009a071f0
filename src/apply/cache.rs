//! In-flight entry cache
//!
//! Holds recently appended entries so the apply worker can skip a log read
//! on the common path. Best effort: entries may be evicted at any time, and
//! a miss simply falls back to the log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::log::LogEntry;
use crate::protocol::encoded_len;

/// Term (8) + index (8) on top of the encoded content
const ENTRY_OVERHEAD: usize = 16;

/// Bounded cache of consecutive log entries
pub struct InFlightCache {
    enabled: bool,
    max_entries: usize,
    max_bytes: usize,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct CacheInner {
    /// Entries with consecutive indices, oldest first
    entries: VecDeque<(LogEntry, usize)>,
    total_bytes: usize,
}

impl CacheInner {
    fn first_index(&self) -> Option<i64> {
        self.entries.front().map(|(entry, _)| entry.index)
    }

    fn last_index(&self) -> Option<i64> {
        self.entries.back().map(|(entry, _)| entry.index)
    }

    fn pop_front(&mut self) {
        if let Some((_, size)) = self.entries.pop_front() {
            self.total_bytes -= size;
        }
    }

    fn pop_back(&mut self) {
        if let Some((_, size)) = self.entries.pop_back() {
            self.total_bytes -= size;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }
}

impl InFlightCache {
    pub fn new(enabled: bool, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            enabled,
            max_entries,
            max_bytes,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache that never holds anything
    pub fn disabled() -> Self {
        Self::new(false, 0, 0)
    }

    /// Cache an appended entry
    ///
    /// A non-consecutive index restarts the cache from this entry.
    pub fn put(&self, entry: LogEntry) {
        if !self.enabled || self.max_entries == 0 {
            return;
        }

        let size = encoded_len(&entry.content) + ENTRY_OVERHEAD;
        let mut inner = self.inner.lock();

        if let Some(last) = inner.last_index() {
            if entry.index != last + 1 {
                tracing::debug!(
                    expected = last + 1,
                    got = entry.index,
                    "Non-consecutive entry, clearing in-flight cache"
                );
                inner.clear();
            }
        }

        inner.entries.push_back((entry, size));
        inner.total_bytes += size;

        while inner.entries.len() > self.max_entries
            || (inner.total_bytes > self.max_bytes && inner.entries.len() > 1)
        {
            inner.pop_front();
        }
    }

    /// Look up the entry at `index`
    pub fn get(&self, index: i64) -> Option<LogEntry> {
        if !self.enabled {
            return None;
        }

        let inner = self.inner.lock();
        let found = inner.first_index().and_then(|first| {
            let position = usize::try_from(index - first).ok()?;
            inner.entries.get(position).map(|(entry, _)| entry.clone())
        });
        drop(inner);

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Drop entries at or after `from_index` (the log was truncated)
    pub fn truncate(&self, from_index: i64) {
        let mut inner = self.inner.lock();
        while inner.last_index().is_some_and(|last| last >= from_index) {
            inner.pop_back();
        }
    }

    /// Drop entries up to and including `up_to_index` (they were applied)
    pub fn prune(&self, up_to_index: i64) {
        let mut inner = self.inner.lock();
        while inner.first_index().is_some_and(|first| first <= up_to_index) {
            inner.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
