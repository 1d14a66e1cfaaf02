//! Network messages exchanged with shard leaders.
//!
//! The generator sends two kinds of messages (transaction lists and a final
//! stop) and receives one (block announcements). All of them share a single
//! codec defined in [`codec`].

pub mod codec;
mod message;
mod wire;

pub use codec::{
    decode_account_block, decode_message, encode_account_block, encode_message,
    encode_stop_message, encode_transaction_list, CodecError,
};
pub use message::Message;
