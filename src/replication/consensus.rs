//! Consensus layer seam
//!
//! Leader election and log replication live outside this crate. This is the
//! part of that layer the id allocation stack talks to.

use crossbeam::channel::Receiver;

use crate::error::ReplicationError;
use crate::identity::{LeaderSwitch, MemberId};
use crate::protocol::ReplicatedContent;

pub trait ConsensusModule: Send + Sync {
    /// Hand `content` to the leader for appending
    ///
    /// Success means the content was accepted for replication, not that it
    /// is committed.
    fn propose(&self, content: ReplicatedContent) -> Result<(), ReplicationError>;

    fn current_term(&self) -> u64;

    /// The leader of the current term, if known
    fn leader(&self) -> Option<MemberId>;

    /// Subscribe to leader changes; each call returns a fresh receiver
    fn leader_switches(&self) -> Receiver<LeaderSwitch>;
}
