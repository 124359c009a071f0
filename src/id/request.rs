//! Replicated id allocation request
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬──────────────┬─────────────────┬──────────────────┐
//! │ Owner (16)   │ IdType (i32) │ RangeStart (u64)│ RangeLength (i32)│
//! └──────────────┴──────────────┴─────────────────┴──────────────────┘
//! ```
//! All integers big-endian.

use bytes::{Buf, BufMut};

use crate::error::{IdError, Result};
use crate::identity::MemberId;

use super::IdType;

/// Encoded size of a request
pub const REQUEST_SIZE: usize = 16 + 4 + 8 + 4;

/// A proposal to reserve `[range_start, range_start + range_length)` for `owner`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicatedIdAllocationRequest {
    pub owner: MemberId,
    pub id_type: IdType,
    pub range_start: u64,
    pub range_length: u32,
}

impl ReplicatedIdAllocationRequest {
    pub fn new(owner: MemberId, id_type: IdType, range_start: u64, range_length: u32) -> Self {
        Self {
            owner,
            id_type,
            range_start,
            range_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u128(self.owner.as_u128());
        buf.put_i32(self.id_type.ordinal());
        buf.put_u64(self.range_start);
        debug_assert!(self.range_length <= i32::MAX as u32, "range length overflows the wire format");
        buf.put_i32(self.range_length as i32);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < REQUEST_SIZE {
            return Err(IdError::Protocol(format!(
                "Incomplete id allocation request: expected {} bytes, got {}",
                REQUEST_SIZE,
                buf.remaining()
            )));
        }

        let owner = MemberId::from_u128(buf.get_u128());
        let id_type = IdType::from_ordinal(buf.get_i32())?;
        let range_start = buf.get_u64();
        let range_length = buf.get_i32();

        if range_length < 0 {
            return Err(IdError::Protocol(format!(
                "Negative range length in id allocation request: {}",
                range_length
            )));
        }

        Ok(Self {
            owner,
            id_type,
            range_start,
            range_length: range_length as u32,
        })
    }
}
