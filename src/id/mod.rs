//! Id Module
//!
//! Client-facing id generation backed by cluster-wide range allocation.
//!
//! ## Responsibilities
//! - Describe id types, ranges and the replicated allocation request
//! - Acquire ranges from the cluster with propose-and-retry
//! - Serve ids locally out of the acquired range
//! - Gate reuse of freed ids on leadership catch-up
//!
//! ## Flow
//! ```text
//!   next_id() ──▶ reusable ids ──▶ range queue ──(exhausted)──▶ acquirer
//!                                                                  │
//!                       propose [first_unallocated, +len) ◀────────┘
//!                                  │ rejected: re-read and retry
//!                                  ▼ accepted
//!                           new range, clipped to high id
//! ```

mod types;
mod request;
mod generator;
mod acquirer;
mod filter;
mod reusability;
mod factory;

pub use types::{IdAllocation, IdRange, IdRangeIterator, IdType};
pub use request::{ReplicatedIdAllocationRequest, REQUEST_SIZE};
pub use generator::{respecting_high_id, IdGenerator, ReplicatedIdGenerator};
pub use acquirer::{IdRangeAcquirer, ReplicatedIdRangeAcquirer};
pub use filter::FreeIdFilteredIdGenerator;
pub use reusability::{IdReusabilityCondition, ReuseGate};
pub use factory::ReplicatedIdGeneratorFactory;
