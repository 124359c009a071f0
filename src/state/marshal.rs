//! State marshalling

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{IdError, Result};

/// Converts one kind of state to and from bytes
pub trait StateMarshal<T>: Send + Sync {
    /// State used when nothing has been persisted yet
    fn start_state(&self) -> T;

    fn marshal(&self, state: &T, buf: &mut BytesMut) -> Result<()>;

    fn unmarshal(&self, buf: &mut Bytes) -> Result<T>;
}

/// A single big-endian `i64`, used for the last flushed command index
#[derive(Debug, Clone, Copy, Default)]
pub struct LongIndexMarshal;

impl StateMarshal<i64> for LongIndexMarshal {
    fn start_state(&self) -> i64 {
        -1
    }

    fn marshal(&self, state: &i64, buf: &mut BytesMut) -> Result<()> {
        buf.put_i64(*state);
        Ok(())
    }

    fn unmarshal(&self, buf: &mut Bytes) -> Result<i64> {
        if buf.remaining() < 8 {
            return Err(IdError::Corruption(format!(
                "Index state truncated: expected 8 bytes, got {}",
                buf.remaining()
            )));
        }
        Ok(buf.get_i64())
    }
}
