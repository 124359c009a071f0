//! Protocol Module
//!
//! Defines the content that travels through the replicated log.
//!
//! ## Content Format
//!
//! ```text
//! ┌──────────┬─────────────────────────────────────────┐
//! │ Tag (1)  │               Payload                   │
//! └──────────┴─────────────────────────────────────────┘
//! ```
//!
//! ### Content Tags
//! - 0x01: COMMAND            - Payload: command tag (1) + command payload
//! - 0x02: OPERATION          - Payload: global session (32) + operation id (16) + command
//! - 0x03: NEW_LEADER_BARRIER - Payload: empty
//!
//! ### Command Tags
//! - 0x01: ID_ALLOCATION - Payload: replicated id allocation request

mod content;
mod operation;
mod codec;

pub use content::{ContentType, CoreCommand, ReplicatedContent};
pub use operation::{DistributedOperation, GlobalSession, LocalOperationId};
pub use codec::{decode_content, encode_content, encoded_len};
