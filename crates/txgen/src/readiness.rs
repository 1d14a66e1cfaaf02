//! Per-shard readiness signalling.
//!
//! The block listener signals a shard after applying one of its blocks; the
//! account-model loop waits for a signal before generating for that shard.
//! At most one signal per shard is ever pending, so a burst of blocks from
//! one shard collapses into a single round of generation.

use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use txgen_types::ShardId;

/// Create a readiness channel able to hold one pending signal per shard.
pub fn readiness_channel(num_shards: usize) -> (ReadinessSender, ReadinessReceiver) {
    let (tx, rx) = mpsc::channel(num_shards.max(1));
    let pending = Arc::new(DashSet::new());
    (
        ReadinessSender {
            tx,
            pending: pending.clone(),
        },
        ReadinessReceiver { rx, pending },
    )
}

/// Producer side, cloneable across tasks.
#[derive(Clone, Debug)]
pub struct ReadinessSender {
    tx: mpsc::Sender<ShardId>,
    pending: Arc<DashSet<ShardId>>,
}

impl ReadinessSender {
    /// Mark `shard` ready without blocking.
    ///
    /// Returns `false` if a signal for the shard is already pending or the
    /// receiver is gone.
    pub fn signal(&self, shard: ShardId) -> bool {
        if !self.pending.insert(shard) {
            trace!(shard = shard.0, "Readiness already pending");
            return false;
        }
        if self.tx.try_send(shard).is_err() {
            self.pending.remove(&shard);
            return false;
        }
        true
    }

    /// Number of shards with a pending signal.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Consumer side, owned by the generation loop.
#[derive(Debug)]
pub struct ReadinessReceiver {
    rx: mpsc::Receiver<ShardId>,
    pending: Arc<DashSet<ShardId>>,
}

impl ReadinessReceiver {
    /// Wait for the next ready shard. Returns `None` once every sender is
    /// gone and no signal remains.
    pub async fn recv(&mut self) -> Option<ShardId> {
        let shard = self.rx.recv().await?;
        self.pending.remove(&shard);
        Some(shard)
    }

    /// Take a ready shard if one is queued.
    pub fn try_recv(&mut self) -> Option<ShardId> {
        let shard = self.rx.try_recv().ok()?;
        self.pending.remove(&shard);
        Some(shard)
    }
}
