//! Local session pool
//!
//! Each member proposes under one global session. Concurrent proposers each
//! borrow a local session so sequence numbers within a local session stay
//! strictly increasing.

use parking_lot::Mutex;

use crate::identity::MemberId;
use crate::protocol::{GlobalSession, LocalOperationId};

/// One local session, checked out by a single proposer at a time
#[derive(Debug)]
pub struct OperationContext {
    local_session_id: u64,
    next_sequence_number: u64,
}

impl OperationContext {
    /// Identity for the next operation in this local session
    pub fn next_operation_id(&mut self) -> LocalOperationId {
        let id = LocalOperationId::new(self.local_session_id, self.next_sequence_number);
        self.next_sequence_number += 1;
        id
    }

    pub fn local_session_id(&self) -> u64 {
        self.local_session_id
    }
}

pub struct LocalSessionPool {
    global_session: GlobalSession,
    idle: Mutex<Vec<OperationContext>>,
    next_local_session_id: Mutex<u64>,
}

impl LocalSessionPool {
    /// A pool under a fresh global session for `owner`
    pub fn new(owner: MemberId) -> Self {
        Self::with_global_session(GlobalSession::random(owner))
    }

    pub fn with_global_session(global_session: GlobalSession) -> Self {
        Self {
            global_session,
            idle: Mutex::new(Vec::new()),
            next_local_session_id: Mutex::new(0),
        }
    }

    pub fn global_session(&self) -> GlobalSession {
        self.global_session
    }

    /// Check out an idle local session, opening a new one if none is idle
    pub fn acquire(&self) -> OperationContext {
        if let Some(context) = self.idle.lock().pop() {
            return context;
        }
        let mut next = self.next_local_session_id.lock();
        let context = OperationContext {
            local_session_id: *next,
            next_sequence_number: 0,
        };
        *next += 1;
        context
    }

    pub fn release(&self, context: OperationContext) {
        self.idle.lock().push(context);
    }

    /// Number of local sessions opened so far
    pub fn opened_sessions(&self) -> u64 {
        *self.next_local_session_id.lock()
    }
}
