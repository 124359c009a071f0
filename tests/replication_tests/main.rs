//! Tests for the propose path: sessions, progress, consensus, replicator


use std::sync::Arc;

use parking_lot::Mutex;
use replicated_ids::apply::{CommitListener, InFlightCache};
use replicated_ids::id::{IdType, ReplicatedIdAllocationRequest};
use replicated_ids::protocol::CoreCommand;
use replicated_ids::MemberId;

/// Records every commit notification
#[derive(Default)]
pub struct RecordingListener {
    pub commits: Mutex<Vec<i64>>,
}

impl CommitListener for RecordingListener {
    fn notify_committed(&self, commit_index: i64) {
        self.commits.lock().push(commit_index);
    }
}

pub fn cache() -> Arc<InFlightCache> {
    Arc::new(InFlightCache::new(true, 64, 1024 * 1024))
}

pub fn allocation(owner: MemberId, range_start: u64, range_length: u32) -> CoreCommand {
    CoreCommand::IdAllocation(ReplicatedIdAllocationRequest::new(
        owner,
        IdType::Node,
        range_start,
        range_length,
    ))
}
