//! State Module
//!
//! The id allocation state machine and the durable storage of state machine
//! state.
//!
//! ## Responsibilities
//! - Keep the per-type "first unallocated id" ledger
//! - Apply allocation requests idempotently by command index
//! - Snapshot and install the ledger wholesale
//! - Persist state atomically with a CRC trailer
//!
//! ## Ledger Format
//! ```text
//! ┌───────────┬──────────────────────────────┬──────────────────────────┐
//! │ Count (8) │ Count × FirstUnallocated (8) │ AppliedCommandIndex (8)  │
//! └───────────┴──────────────────────────────┴──────────────────────────┘
//! ```
//!
//! ## State File Format
//! ```text
//! ┌─────────────────────────────┬─────────┐
//! │ Marshalled state            │ CRC (4) │
//! └─────────────────────────────┴─────────┘
//! ```

mod allocation;
mod marshal;
mod storage;
mod machine;

pub use allocation::{IdAllocationState, IdAllocationStateMarshal};
pub use marshal::{LongIndexMarshal, StateMarshal};
pub use storage::{FileStateStorage, InMemoryStateStorage, StateStorage};
pub use machine::ReplicatedIdAllocationStateMachine;
