//! Block update listener.
//!
//! Consumes block announcements from the block server. For each block it
//! works out which shard the block belongs to, applies it to that shard's
//! mirror, confirms any tracked cross-shard transactions it contains, and
//! signals the shard ready for more generation.

use crate::mirror::MirrorSet;
use crate::readiness::ReadinessSender;
use crate::tracker::{Confirmation, CrossShardTracker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use txgen_messages::{decode_account_block, CodecError};
use txgen_types::{AccountBlock, Block, Hash, ShardId, Transaction};

/// Where a block's shard assignment came from.
#[derive(Debug)]
pub enum ShardSource {
    /// The embedded account payload named the shard.
    AccountPayload,
    /// The block carried no account payload; its own tag was used.
    BlockTag,
    /// The account payload failed to decode; the block tag was used.
    Fallback { error: CodecError },
}

/// Result of resolving a block's shard.
#[derive(Debug)]
pub struct ShardResolution {
    pub shard: ShardId,
    pub source: ShardSource,
    /// The decoded account payload, when there was one.
    pub account_block: Option<AccountBlock>,
}

/// Decide which shard `block` belongs to.
///
/// A block with a non-empty account payload belongs to the shard named in
/// that payload. Blocks without one, or whose payload does not decode,
/// fall back to the block's own shard tag.
pub fn resolve_shard(block: &Block) -> ShardResolution {
    if !block.has_account_payload() {
        return ShardResolution {
            shard: block.shard_id,
            source: ShardSource::BlockTag,
            account_block: None,
        };
    }

    match decode_account_block(&block.account_payload) {
        Ok(account_block) => ShardResolution {
            shard: account_block.shard_id,
            source: ShardSource::AccountPayload,
            account_block: Some(account_block),
        },
        Err(error) => ShardResolution {
            shard: block.shard_id,
            source: ShardSource::Fallback { error },
            account_block: None,
        },
    }
}

/// Listener counters.
#[derive(Debug, Default)]
pub struct ListenerStats {
    applied: AtomicU64,
    ignored: AtomicU64,
    rejected: AtomicU64,
    fallbacks: AtomicU64,
    settled: AtomicU64,
}

impl ListenerStats {
    /// Blocks applied to a mirror.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Blocks for shards without a mirror.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Blocks a mirror refused to apply.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Blocks whose account payload failed to decode.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Cross-shard transactions settled by observed blocks.
    pub fn settled(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }
}

/// Applies announced blocks to the mirrors.
#[derive(Clone)]
pub struct BlockListener {
    mirrors: MirrorSet,
    readiness: ReadinessSender,
    tracker: Arc<CrossShardTracker>,
    stats: Arc<ListenerStats>,
}

impl BlockListener {
    pub fn new(
        mirrors: MirrorSet,
        readiness: ReadinessSender,
        tracker: Arc<CrossShardTracker>,
    ) -> Self {
        Self {
            mirrors,
            readiness,
            tracker,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<ListenerStats> {
        &self.stats
    }

    /// Handle one block announcement.
    ///
    /// Blocks are processed in order; each is applied and acknowledged by
    /// its mirror before its shard is signalled ready. A block the mirror
    /// rejects leaves the mirror unchanged and does not signal, so under the
    /// account model that shard generates again only after its next applied
    /// block.
    pub async fn handle_blocks(&self, blocks: Vec<Block>) {
        for block in blocks {
            self.handle_block(block).await;
        }
    }

    async fn handle_block(&self, block: Block) {
        let resolution = resolve_shard(&block);
        let shard = resolution.shard;

        if let ShardSource::Fallback { error } = &resolution.source {
            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
            debug!(
                tag = block.shard_id.0,
                error = %error,
                "Undecodable account payload, using block tag"
            );
        }

        let Some(mirror) = self.mirrors.get(shard) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(shard = shard.0, height = block.height.0, "Block for unmirrored shard");
            return;
        };

        let tx_ids: Vec<Hash> = block
            .transactions
            .iter()
            .map(Transaction::id)
            .chain(
                resolution
                    .account_block
                    .iter()
                    .flat_map(|account| account.transactions.iter().map(Transaction::id)),
            )
            .collect();
        let height = block.height;

        match mirror.apply(block, resolution.account_block).await {
            Ok(applied) => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                self.confirm(&tx_ids, shard);
                let signalled = self.readiness.signal(shard);
                debug!(
                    shard = shard.0,
                    height = height.0,
                    txs = applied,
                    signalled,
                    "Block applied"
                );
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(shard = shard.0, height = height.0, error = %e, "Failed to apply block");
            }
        }
    }

    fn confirm(&self, tx_ids: &[Hash], shard: ShardId) {
        for id in tx_ids {
            if let Confirmation::Settled(record) = self.tracker.confirm(id, shard) {
                self.stats.settled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    tx = ?record.id,
                    shards = record.origin_shards.len(),
                    "Cross-shard transaction settled"
                );
            }
        }
    }

    /// Process announcements until the channel closes.
    pub async fn run(self, mut blocks: mpsc::Receiver<Vec<Block>>) {
        while let Some(batch) = blocks.recv().await {
            self.handle_blocks(batch).await;
        }
        info!(
            applied = self.stats.applied(),
            ignored = self.stats.ignored(),
            rejected = self.stats.rejected(),
            fallbacks = self.stats.fallbacks(),
            "Block listener stopped"
        );
    }
}
