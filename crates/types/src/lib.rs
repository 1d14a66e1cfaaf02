//! Core types shared by the transaction generator crates.
//!
//! Everything here is plain data: identifiers, hashes, the two transaction
//! models, blocks observed from shard leaders, and the static leader map.

mod block;
mod hash;
mod identifiers;
mod topology;
mod transaction;

pub use block::{AccountBlock, Block};
pub use hash::Hash;
pub use identifiers::{Address, BlockHeight, OutPoint, ShardId};
pub use topology::{HexError, LeaderEndpoint, LeaderMap, PeerPublicKey};
pub use transaction::{
    AccountTransaction, Transaction, TxBatch, TxInput, TxOutput, UtxoTransaction,
};
