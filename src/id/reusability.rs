//! Reuse gate for freed ids
//!
//! A freed id may have been proposed by the previous leader and still be in
//! flight. A new leader only reuses ids once it has applied everything that
//! was in the log when it took over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::apply::CommandIndexTracker;
use crate::identity::{LeaderSwitch, MemberId};

/// Whether freed ids may be handed out again right now
pub trait ReuseGate: Send + Sync {
    fn is_reuse_safe(&self) -> bool;
}

enum ReuseState {
    NotLeader,
    LeaderSince {
        command_index_at_election: i64,
        caught_up: bool,
    },
}

/// Tracks leadership and local apply progress to decide reuse safety
pub struct IdReusabilityCondition {
    me: MemberId,
    tracker: Arc<CommandIndexTracker>,
    events: Receiver<LeaderSwitch>,
    state: Mutex<ReuseState>,

    /// Last answer, read without the lock while no leader switch is pending
    safe: AtomicBool,
}

impl IdReusabilityCondition {
    pub fn new(me: MemberId, tracker: Arc<CommandIndexTracker>, events: Receiver<LeaderSwitch>) -> Self {
        Self {
            me,
            tracker,
            events,
            state: Mutex::new(ReuseState::NotLeader),
            safe: AtomicBool::new(false),
        }
    }

    fn on_leader_switch(&self, state: &mut ReuseState, switch: LeaderSwitch) {
        if switch.epoch.is_led_by(self.me) {
            tracing::info!(
                term = switch.epoch.term,
                command_index_at_election = switch.last_index_before_election,
                "Id reuse blocked until this leader catches up"
            );
            *state = ReuseState::LeaderSince {
                command_index_at_election: switch.last_index_before_election,
                caught_up: false,
            };
        } else {
            tracing::debug!(term = switch.epoch.term, "Not leader, id reuse disabled");
            *state = ReuseState::NotLeader;
        }
    }
}

impl ReuseGate for IdReusabilityCondition {
    fn is_reuse_safe(&self) -> bool {
        if self.events.is_empty() && self.safe.load(Ordering::Acquire) {
            return true;
        }

        let mut state = self.state.lock();
        for switch in self.events.try_iter() {
            self.on_leader_switch(&mut state, switch);
        }

        let safe = match &mut *state {
            ReuseState::NotLeader => false,
            ReuseState::LeaderSince {
                command_index_at_election,
                caught_up,
            } => {
                if !*caught_up && self.tracker.applied_command_index() > *command_index_at_election {
                    tracing::debug!(
                        command_index_at_election = *command_index_at_election,
                        "Leader caught up, id reuse enabled"
                    );
                    *caught_up = true;
                }
                *caught_up
            }
        };

        self.safe.store(safe, Ordering::Release);
        safe
    }
}
