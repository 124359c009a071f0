//! Replication Module
//!
//! Getting commands into the committed log and waiting for their results.
//!
//! ## Responsibilities
//! - Describe the consensus layer this crate builds on
//! - Wrap commands into operations of a pooled local session
//! - Block a proposer until its operation is applied locally
//! - Provide a single-member consensus for standalone use
//!
//! ## Propose Path
//! ```text
//!  replicate(cmd) ──▶ LocalSessionPool ──▶ DistributedOperation
//!                                               │
//!        ProgressTracker.start ◀────────────────┤
//!                                               ▼
//!                                  ConsensusModule.propose
//!                                               │ committed, applied
//!                                               ▼
//!        ProgressTracker.track_result ──▶ Progress.await_result
//! ```

mod consensus;
mod progress;
mod session_pool;
mod replicator;
mod local;

pub use consensus::ConsensusModule;
pub use progress::{Progress, ProgressTracker};
pub use session_pool::{LocalSessionPool, OperationContext};
pub use replicator::{RaftReplicator, Replicator};
pub use local::LocalConsensus;
