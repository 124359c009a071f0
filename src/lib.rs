//! # replicated-ids
//!
//! Cluster-wide unique id allocation on top of a replicated consensus log:
//! - Exactly-once application of the committed log (dedup, batching, flushing)
//! - Per-type high-water-mark ledger with idempotent apply and snapshots
//! - Propose-and-retry range acquisition for local id generators
//! - Reuse gate for freed ids across leadership changes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Id Generators (per type)                   │
//! │            next_id / next_id_batch / free_id                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ range exhausted
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Range Acquirer + Replicator                  │
//! │              (propose, await apply, retry)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Consensus  │─commit──▶│   Applier   │
//!   │    + Log    │          │ (1 thread)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  Allocation │
//!                           │State Machine│
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod identity;

pub mod protocol;
pub mod log;
pub mod apply;
pub mod state;
pub mod replication;
pub mod id;
pub mod member;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{IdError, ReplicationError, Result};
pub use config::Config;
pub use identity::MemberId;
pub use id::{IdGenerator, IdRange, IdType};
pub use member::CoreMember;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of replicated-ids
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
