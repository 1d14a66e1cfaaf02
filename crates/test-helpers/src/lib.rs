//! Fixtures shared by the generator's tests.
//!
//! Leader maps built here use `127.0.0.1:{BASE_PORT + shard}`, which is
//! what [`RecordingTransport::messages_to`] relies on to attribute
//! deliveries back to shards.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use txgen_messages::{decode_message, encode_account_block, Message};
use txgen_network::{Transport, TransportError};
use txgen_types::{
    AccountBlock, AccountTransaction, Address, Block, BlockHeight, Hash, LeaderEndpoint,
    LeaderMap, PeerPublicKey, ShardId, UtxoTransaction,
};

/// Port of shard 0's leader in fixture maps.
pub const BASE_PORT: u16 = 19_000;

/// Endpoint of `shard`'s leader in fixture maps.
pub fn leader_endpoint(shard: ShardId) -> LeaderEndpoint {
    let address = SocketAddr::from(([127, 0, 0, 1], BASE_PORT + shard.0 as u16));
    LeaderEndpoint::new(address, PeerPublicKey::for_address(&address))
}

/// Shard whose fixture leader listens on `endpoint`.
pub fn fixture_shard(endpoint: &LeaderEndpoint) -> ShardId {
    ShardId(u32::from(endpoint.address.port().saturating_sub(BASE_PORT)))
}

/// Leader map for shards `0..num_shards`.
pub fn leader_map(num_shards: u32) -> LeaderMap {
    LeaderMap::new((0..num_shards).map(|shard| (ShardId(shard), leader_endpoint(ShardId(shard)))))
}

/// `count` intra-shard transfers between pool addresses of `shard`.
pub fn transfers(shard: ShardId, count: usize) -> Vec<AccountTransaction> {
    (0..count)
        .map(|i| {
            AccountTransaction::new(
                Address::synthetic(shard, i as u32),
                shard,
                Address::synthetic(shard, i as u32 + 1),
                shard,
                1,
                0,
            )
        })
        .collect()
}

/// A UTXO-model block.
pub fn utxo_block(shard: ShardId, height: u64, transactions: Vec<UtxoTransaction>) -> Block {
    Block {
        shard_id: shard,
        height: BlockHeight(height),
        hash: Hash::from_parts(&[b"fixture/block", &shard.0.to_le_bytes(), &height.to_le_bytes()]),
        parent_hash: Hash::ZERO,
        transactions,
        account_payload: Vec::new(),
    }
}

/// A block carrying an account-model payload.
///
/// `tag` is the shard stamped on the outer block, which may differ from the
/// shard inside the payload.
pub fn account_block(
    tag: ShardId,
    payload_shard: ShardId,
    height: u64,
    transactions: Vec<AccountTransaction>,
) -> Block {
    let inner = AccountBlock {
        shard_id: payload_shard,
        height: BlockHeight(height),
        parent_hash: Hash::ZERO,
        transactions,
    };
    let mut block = utxo_block(tag, height, Vec::new());
    block.account_payload =
        encode_account_block(&inner).expect("fixture account block should encode");
    block
}

/// Transport that records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(LeaderEndpoint, Message)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<(LeaderEndpoint, Message)> {
        self.sent.lock().clone()
    }

    /// Messages delivered to `shard`'s fixture leader.
    pub fn messages_to(&self, shard: ShardId) -> Vec<Message> {
        let address = leader_endpoint(shard).address;
        self.sent
            .lock()
            .iter()
            .filter(|(endpoint, _)| endpoint.address == address)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Stop messages delivered to `shard`'s fixture leader.
    pub fn stops_to(&self, shard: ShardId) -> usize {
        self.messages_to(shard)
            .iter()
            .filter(|message| message.is_stop())
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, endpoint: &LeaderEndpoint, payload: Bytes) -> Result<(), TransportError> {
        let message = decode_message(&payload)?;
        self.sent.lock().push((endpoint.clone(), message));
        Ok(())
    }
}

/// Transport that fails sends to some shards and records the rest.
#[derive(Debug, Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
    /// `None` fails every shard.
    failing: Option<BTreeSet<ShardId>>,
    delivered: RecordingTransport,
}

impl FailingTransport {
    /// Fail every send.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail only sends to the given shards.
    pub fn for_shards(shards: impl IntoIterator<Item = ShardId>) -> Self {
        Self {
            failing: Some(shards.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Number of failed sends.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages that went through to healthy shards.
    pub fn delivered(&self) -> &RecordingTransport {
        &self.delivered
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, endpoint: &LeaderEndpoint, payload: Bytes) -> Result<(), TransportError> {
        let fails = self
            .failing
            .as_ref()
            .map_or(true, |shards| shards.contains(&fixture_shard(endpoint)));
        if fails {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Closed);
        }
        self.delivered.send(endpoint, payload).await
    }
}

/// Transport whose transaction lists take `batch_delay` to deliver.
///
/// Stop messages go through immediately; the time each one lands is kept.
#[derive(Debug)]
pub struct DelayedTransport {
    batch_delay: Duration,
    delivered: RecordingTransport,
    stops_at: Mutex<Vec<(ShardId, Instant)>>,
}

impl DelayedTransport {
    pub fn new(batch_delay: Duration) -> Self {
        Self {
            batch_delay,
            delivered: RecordingTransport::new(),
            stops_at: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> &RecordingTransport {
        &self.delivered
    }

    /// When each stop message was delivered.
    pub fn stops_at(&self) -> Vec<(ShardId, Instant)> {
        self.stops_at.lock().clone()
    }
}

#[async_trait]
impl Transport for DelayedTransport {
    async fn send(&self, endpoint: &LeaderEndpoint, payload: Bytes) -> Result<(), TransportError> {
        let message = decode_message(&payload)?;
        if message.is_stop() {
            self.stops_at
                .lock()
                .push((fixture_shard(endpoint), Instant::now()));
        } else {
            tokio::time::sleep(self.batch_delay).await;
        }
        self.delivered.send(endpoint, payload).await
    }
}
