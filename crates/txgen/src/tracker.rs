//! Cross-shard transaction tracking.
//!
//! Every cross-shard transaction the generator emits is recorded here with
//! the set of shards it touches. Block announcements confirm it shard by
//! shard; once every origin shard has included it the record is removed.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use txgen_types::{Hash, ShardId, Transaction};

/// A tracked cross-shard transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossShardRecord {
    pub id: Hash,
    /// Shards supplying inputs to the transaction.
    pub origin_shards: BTreeSet<ShardId>,
    /// When the transaction was recorded.
    pub created_at: Instant,
    /// Origin shards that have not yet included the transaction.
    pub awaiting: BTreeSet<ShardId>,
}

/// Outcome of a confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// The transaction is not tracked.
    Untracked,
    /// Still waiting on `remaining` shards.
    Pending { remaining: usize },
    /// Every origin shard has included the transaction; the record is gone.
    Settled(CrossShardRecord),
}

/// Shared registry of in-flight cross-shard transactions.
///
/// Safe for concurrent use from the generation loop and the block listener.
#[derive(Debug, Default)]
pub struct CrossShardTracker {
    records: Mutex<HashMap<Hash, CrossShardRecord>>,
    settled: AtomicU64,
}

impl CrossShardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cross-shard transaction.
    ///
    /// Recording an ID that is already tracked replaces the earlier record.
    pub fn record(&self, id: Hash, origin_shards: BTreeSet<ShardId>, created_at: Instant) {
        let record = CrossShardRecord {
            id,
            awaiting: origin_shards.clone(),
            origin_shards,
            created_at,
        };
        self.records.lock().insert(id, record);
    }

    /// Record every cross-shard transaction in `txs`, skipping the rest.
    ///
    /// Returns the number recorded.
    pub fn record_all<'a, T: Transaction + 'a>(
        &self,
        txs: impl IntoIterator<Item = &'a T>,
        created_at: Instant,
    ) -> usize {
        let mut records = self.records.lock();
        let mut count = 0;
        for tx in txs {
            let origin_shards = tx.input_shards();
            if origin_shards.len() < 2 {
                continue;
            }
            records.insert(
                tx.id(),
                CrossShardRecord {
                    id: tx.id(),
                    awaiting: origin_shards.clone(),
                    origin_shards,
                    created_at,
                },
            );
            count += 1;
        }
        count
    }

    /// Note that `shard` has included transaction `id`.
    pub fn confirm(&self, id: &Hash, shard: ShardId) -> Confirmation {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(id) else {
            return Confirmation::Untracked;
        };

        record.awaiting.remove(&shard);
        if !record.awaiting.is_empty() {
            return Confirmation::Pending {
                remaining: record.awaiting.len(),
            };
        }

        match records.remove(id) {
            Some(record) => {
                self.settled.fetch_add(1, Ordering::Relaxed);
                Confirmation::Settled(record)
            }
            None => Confirmation::Untracked,
        }
    }

    /// Stop tracking `id`. Returns the removed record.
    pub fn clear(&self, id: &Hash) -> Option<CrossShardRecord> {
        self.records.lock().remove(id)
    }

    /// Stop tracking everything. Returns how many records were dropped.
    pub fn clear_all(&self) -> usize {
        let mut records = self.records.lock();
        let count = records.len();
        records.clear();
        count
    }

    /// Drop records created more than `max_age` before `now`.
    pub fn expire_older_than(&self, max_age: Duration, now: Instant) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| now.saturating_duration_since(record.created_at) <= max_age);
        before - records.len()
    }

    pub fn get(&self, id: &Hash) -> Option<CrossShardRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.records.lock().contains_key(id)
    }

    /// Number of in-flight records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Transactions settled on every origin shard since startup.
    pub fn settled_count(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }
}
