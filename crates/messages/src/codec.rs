//! Message encoding and decoding for the leader link.
//!
//! # Wire Format
//!
//! Every message is bincode-encoded then LZ4-compressed:
//!
//! ```text
//! [LZ4 compressed bincode payload]
//! ```
//!
//! Framing (length prefixes on a stream) belongs to the transport, not to
//! this codec.
//!
//! Account-model block payloads embedded in [`Block::account_payload`] use
//! plain bincode without compression, since they are already nested inside a
//! compressed `Blocks` message.
//!
//! [`Block::account_payload`]: txgen_types::Block::account_payload

use crate::message::Message;
use crate::wire;
use thiserror::Error;
use txgen_types::{AccountBlock, TxBatch};

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),
}

/// Encode a message to wire format.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    let bytes = bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(wire::compress(&bytes))
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<Message, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }

    let payload = wire::decompress(data).map_err(|e| CodecError::Decompress(e.to_string()))?;
    bincode::deserialize(&payload).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Build the serialized transaction-list message for a batch.
pub fn encode_transaction_list(batch: TxBatch) -> Result<Vec<u8>, CodecError> {
    encode_message(&Message::TransactionList(batch))
}

/// Build the serialized stop message.
pub fn encode_stop_message() -> Result<Vec<u8>, CodecError> {
    encode_message(&Message::Stop)
}

/// Encode an account-model block for embedding in a block payload.
pub fn encode_account_block(block: &AccountBlock) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(block).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Attempt to interpret a block payload as an account-model block.
///
/// Never panics on foreign or truncated input; callers decide whether a
/// failure is worth reporting.
pub fn decode_account_block(payload: &[u8]) -> Result<AccountBlock, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::MessageTooShort);
    }
    bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))
}
