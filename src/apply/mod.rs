//! Apply Module
//!
//! Turns the committed log into state machine calls.
//!
//! ## Responsibilities
//! - Fetch committed entries (in-flight cache first, log on miss)
//! - Skip replayed client operations (session/sequence dedup)
//! - Assign command indices and dispatch commands in log order
//! - Flush state machines on a fixed cadence
//! - Halt for good on the first failure
//!
//! ## Pipeline
//! ```text
//!  notify_committed(n) ──▶ worker thread ──▶ InFlightCache ──(miss)──▶ RaftLog
//!                               │
//!                               ▼
//!                        SessionTracker (duplicate? skip)
//!                               │
//!                               ▼
//!                   CommandDispatcher (one per batch)
//!                               │
//!                               ▼
//!              state machines ──▶ callback ──▶ ProgressTracker
//! ```

mod cache;
mod session;
mod index;
mod health;
mod dispatcher;
mod process;

pub use cache::InFlightCache;
pub use session::{SessionTracker, SessionTrackerMarshal, SessionTrackerState};
pub use index::CommandIndexTracker;
pub use health::Health;
pub use dispatcher::{
    CommandCallback, CommandDispatcher, CommandResult, CoreSnapshot, CoreStateMachines, StateMachines,
};
pub use process::{ApplierStatus, CommandApplicationProcess, CommitListener};
