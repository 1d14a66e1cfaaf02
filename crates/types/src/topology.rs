//! Static shard topology: which leader fronts which shard.

use crate::{Hash, ShardId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// Errors that can occur when parsing hex strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    /// Invalid hex string length.
    #[error("Invalid hex length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Invalid hex characters.
    #[error("Invalid hex string")]
    InvalidHex,
}

/// Opaque public key identifying a peer.
///
/// The generator never verifies signatures; the key is only carried so that
/// endpoints can be logged and matched.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerPublicKey(pub Vec<u8>);

impl PeerPublicKey {
    /// Parse a key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HexError> {
        if hex.len() % 2 != 0 {
            return Err(HexError::InvalidLength {
                expected: hex.len() + 1,
                actual: hex.len(),
            });
        }
        hex::decode(hex)
            .map(Self)
            .map_err(|_| HexError::InvalidHex)
    }

    /// Deterministic stand-in key for a peer listening at `address`.
    pub fn for_address(address: &SocketAddr) -> Self {
        let hash = Hash::from_parts(&[b"txgen/peer-key", address.to_string().as_bytes()]);
        Self(hash.as_bytes().to_vec())
    }

    /// Hex encoding of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        let shown = hex.get(..16).unwrap_or(&hex);
        write!(f, "PeerPublicKey({})", shown)
    }
}

/// Network endpoint of a shard leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderEndpoint {
    pub address: SocketAddr,
    pub public_key: PeerPublicKey,
}

impl LeaderEndpoint {
    /// Create a new leader endpoint.
    pub fn new(address: SocketAddr, public_key: PeerPublicKey) -> Self {
        Self {
            address,
            public_key,
        }
    }
}

impl fmt::Display for LeaderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Shard → leader mapping, fixed for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderMap {
    leaders: BTreeMap<ShardId, LeaderEndpoint>,
}

impl LeaderMap {
    /// Create a leader map from `(shard, endpoint)` pairs.
    ///
    /// A later entry for the same shard replaces an earlier one.
    pub fn new(leaders: impl IntoIterator<Item = (ShardId, LeaderEndpoint)>) -> Self {
        Self {
            leaders: leaders.into_iter().collect(),
        }
    }

    /// Get the leader for a shard.
    pub fn get(&self, shard: ShardId) -> Option<&LeaderEndpoint> {
        self.leaders.get(&shard)
    }

    /// Check whether a leader exists for a shard.
    pub fn contains(&self, shard: ShardId) -> bool {
        self.leaders.contains_key(&shard)
    }

    /// All known shards in ascending order.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.leaders.keys().copied()
    }

    /// All leader endpoints, ordered by shard.
    pub fn endpoints(&self) -> impl Iterator<Item = &LeaderEndpoint> + '_ {
        self.leaders.values()
    }

    /// Iterate over `(shard, endpoint)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ShardId, &LeaderEndpoint)> + '_ {
        self.leaders.iter().map(|(shard, leader)| (*shard, leader))
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.leaders.len()
    }

    /// Check if the map has no leaders.
    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(port: u16) -> LeaderEndpoint {
        let address: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        LeaderEndpoint::new(address, PeerPublicKey::for_address(&address))
    }

    #[test]
    fn test_leader_map_ordering() {
        let map = LeaderMap::new([
            (ShardId(2), endpoint(9002)),
            (ShardId(0), endpoint(9000)),
            (ShardId(1), endpoint(9001)),
        ]);
        assert_eq!(
            map.shards().collect::<Vec<_>>(),
            vec![ShardId(0), ShardId(1), ShardId(2)]
        );
        assert_eq!(map.get(ShardId(1)).unwrap().address.port(), 9001);
        assert!(!map.contains(ShardId(3)));
    }

    #[test]
    fn test_public_key_hex() {
        let key = PeerPublicKey::from_hex("ab01ff").unwrap();
        assert_eq!(key.0, vec![0xab, 0x01, 0xff]);
        assert_eq!(key.to_hex(), "ab01ff");
        assert!(PeerPublicKey::from_hex("abc").is_err());
        assert_eq!(PeerPublicKey::from_hex("zz"), Err(HexError::InvalidHex));
    }
}
