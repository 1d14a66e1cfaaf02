//! Domain-specific identifier types.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard identifier.
///
/// The set of valid shards is the key set of the leader map supplied at
/// startup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shard({})", self.0)
    }
}

/// Block height.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Genesis block height.
    pub const GENESIS: Self = BlockHeight(0);
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.0)
    }
}

/// A 20-byte account address.
///
/// The generator only needs addresses that are stable and distinct, so they
/// are derived from a hash of the owning shard and a pool index rather than
/// from key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Derive the synthetic address at `index` of a shard's address pool.
    pub fn synthetic(shard: ShardId, index: u32) -> Self {
        let hash = Hash::from_parts(&[
            b"txgen/address",
            &shard.0.to_le_bytes(),
            &index.to_le_bytes(),
        ]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Leading four bytes as a big-endian integer, used to split the
    /// address space into disjoint subsets.
    pub fn partition_key(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Reference to a single output of a UTXO transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// ID of the transaction that created the output.
    pub tx_id: Hash,
    /// Position of the output within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(tx_id: Hash, index: u32) -> Self {
        Self { tx_id, index }
    }
}
