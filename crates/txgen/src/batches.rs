//! Per-shard batch assembly with capacity-bounded admission.

use std::collections::BTreeMap;
use txgen_types::{ShardId, Transaction, TxBatch};

/// Accumulates one outgoing batch per leader shard.
///
/// Every batch is capped at the same size. A cross-shard transaction is
/// copied into the batch of every shard it draws inputs from, and is only
/// admitted when all of those batches still have room, so no shard ever
/// receives a partial fan-out.
#[derive(Debug)]
pub struct ShardBatches<T> {
    batches: BTreeMap<ShardId, Vec<T>>,
    cap: usize,
    dropped: usize,
}

impl<T: Transaction + Clone> ShardBatches<T> {
    /// Create empty batches for `shards`, each holding at most `cap`
    /// transactions.
    pub fn new(shards: impl IntoIterator<Item = ShardId>, cap: usize) -> Self {
        Self {
            batches: shards.into_iter().map(|shard| (shard, Vec::new())).collect(),
            cap,
            dropped: 0,
        }
    }

    /// Admit a transaction into `shard`'s batch only.
    ///
    /// Returns `false` (and counts a drop) if the shard is unknown or full.
    pub fn push_intra(&mut self, shard: ShardId, tx: T) -> bool {
        match self.batches.get_mut(&shard) {
            Some(batch) if batch.len() < self.cap => {
                batch.push(tx);
                true
            }
            _ => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Admit a transaction into the batch of every shard in its input set.
    ///
    /// Returns `false` (and counts a drop) unless every input shard is known
    /// and has room.
    pub fn push_cross(&mut self, tx: T) -> bool {
        let shards = tx.input_shards();
        let fits = shards.iter().all(|shard| {
            self.batches
                .get(shard)
                .is_some_and(|batch| batch.len() < self.cap)
        });
        if !fits {
            self.dropped += 1;
            return false;
        }

        for shard in &shards {
            if let Some(batch) = self.batches.get_mut(shard) {
                batch.push(tx.clone());
            }
        }
        true
    }

    /// Number of transactions queued for `shard`.
    pub fn len_of(&self, shard: ShardId) -> usize {
        self.batches.get(&shard).map_or(0, Vec::len)
    }

    /// Transactions rejected so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Consume into the non-empty batches, keyed by shard.
    pub fn into_batches(self) -> BTreeMap<ShardId, TxBatch>
    where
        Vec<T>: Into<TxBatch>,
    {
        self.batches
            .into_iter()
            .filter(|(_, batch)| !batch.is_empty())
            .map(|(shard, batch)| (shard, batch.into()))
            .collect()
    }
}
