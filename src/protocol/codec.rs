//! Content codec
//!
//! Encoding and decoding of [`ReplicatedContent`] for the durable log.
//!
//! ### Payload by Content Type
//! - COMMAND:            cmd_type (1) + command payload
//! - OPERATION:          session_id (16) + owner (16) + local_session_id (8)
//!                       + sequence_number (8) + cmd_type (1) + command payload
//! - NEW_LEADER_BARRIER: empty
//!
//! Integers are big-endian.

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::error::{IdError, Result};
use crate::id::{ReplicatedIdAllocationRequest, REQUEST_SIZE};
use crate::identity::MemberId;

use super::{ContentType, CoreCommand, DistributedOperation, GlobalSession, LocalOperationId, ReplicatedContent};

/// Command tag for id allocation requests
const ID_ALLOCATION_TAG: u8 = 0x01;

/// Session (32) + operation id (16)
const OPERATION_HEADER_SIZE: usize = 16 + 16 + 8 + 8;

// =============================================================================
// Content Encoding/Decoding
// =============================================================================

/// Encode content to bytes
///
/// Format: content_type (1) + payload
pub fn encode_content(content: &ReplicatedContent) -> Vec<u8> {
    let mut message = Vec::with_capacity(encoded_len(content));
    message.put_u8(content.content_type() as u8);

    match content {
        ReplicatedContent::Command(command) => encode_command(command, &mut message),
        ReplicatedContent::Operation(operation) => {
            message.put_u128(operation.global_session.session_id.as_u128());
            message.put_u128(operation.global_session.owner.as_u128());
            message.put_u64(operation.operation_id.local_session_id);
            message.put_u64(operation.operation_id.sequence_number);
            encode_command(&operation.command, &mut message);
        }
        ReplicatedContent::NewLeaderBarrier => {}
    }

    message
}

/// Number of bytes `encode_content` produces
pub fn encoded_len(content: &ReplicatedContent) -> usize {
    1 + match content {
        ReplicatedContent::Command(command) => command_len(command),
        ReplicatedContent::Operation(operation) => OPERATION_HEADER_SIZE + command_len(&operation.command),
        ReplicatedContent::NewLeaderBarrier => 0,
    }
}

/// Decode content from bytes
///
/// The whole slice must be consumed; trailing bytes are an error.
pub fn decode_content(bytes: &[u8]) -> Result<ReplicatedContent> {
    let mut buf = bytes;
    if !buf.has_remaining() {
        return Err(IdError::Protocol("Empty content".to_string()));
    }

    let content = match buf.get_u8() {
        0x01 => ReplicatedContent::Command(decode_command(&mut buf)?),
        0x02 => ReplicatedContent::Operation(decode_operation(&mut buf)?),
        0x03 => ReplicatedContent::NewLeaderBarrier,
        other => {
            return Err(IdError::Protocol(format!(
                "Unknown content type: 0x{:02x}",
                other
            )))
        }
    };

    if buf.has_remaining() {
        return Err(IdError::Protocol(format!(
            "{:?} content: {} unexpected trailing bytes",
            content.content_type(),
            buf.remaining()
        )));
    }

    Ok(content)
}

fn decode_operation(buf: &mut &[u8]) -> Result<DistributedOperation> {
    if buf.remaining() < OPERATION_HEADER_SIZE {
        return Err(IdError::Protocol(format!(
            "OPERATION content: incomplete header (expected {}, got {})",
            OPERATION_HEADER_SIZE,
            buf.remaining()
        )));
    }

    let session_id = Uuid::from_u128(buf.get_u128());
    let owner = MemberId::from_u128(buf.get_u128());
    let local_session_id = buf.get_u64();
    let sequence_number = buf.get_u64();
    let command = decode_command(buf)?;

    Ok(DistributedOperation::new(
        command,
        GlobalSession::new(session_id, owner),
        LocalOperationId::new(local_session_id, sequence_number),
    ))
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

fn encode_command<B: BufMut>(command: &CoreCommand, buf: &mut B) {
    match command {
        CoreCommand::IdAllocation(request) => {
            buf.put_u8(ID_ALLOCATION_TAG);
            request.encode(buf);
        }
    }
}

fn command_len(command: &CoreCommand) -> usize {
    match command {
        CoreCommand::IdAllocation(_) => 1 + REQUEST_SIZE,
    }
}

fn decode_command(buf: &mut &[u8]) -> Result<CoreCommand> {
    if !buf.has_remaining() {
        return Err(IdError::Protocol("Missing command type".to_string()));
    }

    match buf.get_u8() {
        ID_ALLOCATION_TAG => Ok(CoreCommand::IdAllocation(ReplicatedIdAllocationRequest::decode(buf)?)),
        other => Err(IdError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            other
        ))),
    }
}
