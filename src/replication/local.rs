//! Single-member consensus
//!
//! A cluster of one: every proposal by the leader is committed as soon as it
//! is appended. Keeps the full apply path (log, in-flight cache, commit
//! notifications, leader switches) so a standalone member behaves like a
//! member of a real cluster.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::apply::{CommitListener, InFlightCache};
use crate::error::{ReplicationError, Result};
use crate::identity::{LeaderEpoch, LeaderSwitch, MemberId};
use crate::log::{LogEntry, RaftLog};
use crate::protocol::ReplicatedContent;

use super::ConsensusModule;

pub struct LocalConsensus {
    me: MemberId,
    log: Arc<dyn RaftLog>,
    cache: Arc<InFlightCache>,
    state: Mutex<ConsensusState>,
    listeners: Mutex<Vec<Arc<dyn CommitListener>>>,
    subscribers: Mutex<Vec<Sender<LeaderSwitch>>>,
}

struct ConsensusState {
    term: u64,
    leader: Option<MemberId>,
    commit_index: i64,
}

impl LocalConsensus {
    /// Resume from whatever `log` holds; all of it counts as committed
    pub fn new(me: MemberId, log: Arc<dyn RaftLog>, cache: Arc<InFlightCache>) -> Result<Self> {
        let commit_index = log.append_index();
        let term = match log.read_entry(commit_index)? {
            Some(entry) => entry.term,
            None => 0,
        };

        Ok(Self {
            me,
            log,
            cache,
            state: Mutex::new(ConsensusState {
                term,
                leader: None,
                commit_index,
            }),
            listeners: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.listeners.lock().push(listener);
    }

    /// Announce the recovered commit index to listeners
    pub fn start(&self) {
        let commit_index = self.state.lock().commit_index;
        if commit_index >= 0 {
            tracing::info!(commit_index, "Replaying committed log");
            for listener in self.listeners.lock().iter() {
                listener.notify_committed(commit_index);
            }
        }
    }

    /// Take leadership in a new term and append the leader barrier
    ///
    /// Nothing changes if the barrier cannot be appended.
    pub fn become_leader(&self) -> Result<()> {
        let mut state = self.state.lock();
        let previous_term = state.term;
        let last_index_before_election = self.log.append_index();

        state.term += 1;
        if let Err(e) = self.append_and_commit(&mut state, ReplicatedContent::NewLeaderBarrier) {
            state.term = previous_term;
            tracing::warn!(error = %e, "Could not append leader barrier, staying follower");
            return Err(e);
        }

        state.leader = Some(self.me);
        tracing::info!(term = state.term, member = %self.me, "Became leader");
        self.publish(LeaderSwitch::new(
            LeaderEpoch::new(state.term, state.leader),
            last_index_before_election,
        ));
        Ok(())
    }

    /// Hand leadership to `leader` (or to nobody) in a new term
    pub fn step_down(&self, leader: Option<MemberId>) {
        let mut state = self.state.lock();
        state.term += 1;
        state.leader = leader;

        tracing::info!(term = state.term, leader = ?leader, "Leadership moved away");
        self.publish(LeaderSwitch::new(
            LeaderEpoch::new(state.term, leader),
            self.log.append_index(),
        ));
    }

    pub fn commit_index(&self) -> i64 {
        self.state.lock().commit_index
    }

    pub fn member_id(&self) -> MemberId {
        self.me
    }

    fn append_and_commit(&self, state: &mut ConsensusState, content: ReplicatedContent) -> Result<i64> {
        let index = self.log.append_index() + 1;
        let entry = LogEntry::new(state.term, index, content);
        self.log.append(entry.clone())?;
        self.cache.put(entry);

        state.commit_index = index;
        for listener in self.listeners.lock().iter() {
            listener.notify_committed(index);
        }
        Ok(index)
    }

    fn publish(&self, switch: LeaderSwitch) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(switch).is_ok());
    }
}

impl ConsensusModule for LocalConsensus {
    fn propose(&self, content: ReplicatedContent) -> std::result::Result<(), ReplicationError> {
        let mut state = self.state.lock();
        match state.leader {
            Some(leader) if leader == self.me => {}
            Some(_) => return Err(ReplicationError::NotLeader),
            None => return Err(ReplicationError::NoLeader),
        }

        self.append_and_commit(&mut state, content)
            .map(|_| ())
            .map_err(|e| ReplicationError::Unavailable(e.to_string()))
    }

    fn current_term(&self) -> u64 {
        self.state.lock().term
    }

    fn leader(&self) -> Option<MemberId> {
        self.state.lock().leader
    }

    fn leader_switches(&self) -> Receiver<LeaderSwitch> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }
}
