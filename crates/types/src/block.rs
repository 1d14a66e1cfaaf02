//! Blocks observed from shard leaders.

use crate::{AccountTransaction, BlockHeight, Hash, ShardId, UtxoTransaction};
use serde::{Deserialize, Serialize};

/// A committed block as announced by a shard leader.
///
/// UTXO-model transactions are carried directly. Account-model blocks travel
/// as an opaque encoded [`AccountBlock`] in `account_payload`, whose own
/// shard tag is authoritative when it decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Shard tag attached by the announcing leader.
    pub shard_id: ShardId,
    pub height: BlockHeight,
    pub hash: Hash,
    pub parent_hash: Hash,
    /// UTXO-model transactions committed in this block.
    pub transactions: Vec<UtxoTransaction>,
    /// Encoded account-model block, empty when the shard runs the UTXO model.
    pub account_payload: Vec<u8>,
}

impl Block {
    /// Check if this block carries an account-model payload.
    pub fn has_account_payload(&self) -> bool {
        !self.account_payload.is_empty()
    }
}

/// Account-model block embedded in a [`Block`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBlock {
    pub shard_id: ShardId,
    pub height: BlockHeight,
    pub parent_hash: Hash,
    pub transactions: Vec<AccountTransaction>,
}
