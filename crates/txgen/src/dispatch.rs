//! Outbound delivery of batches and stop messages to shard leaders.

use bytes::Bytes;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use txgen_messages::{encode_stop_message, encode_transaction_list, CodecError};
use txgen_network::{Transport, TransportError};
use txgen_types::{LeaderEndpoint, LeaderMap, ShardId, TxBatch};

/// Errors delivering a batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No leader configured for {0}")]
    UnknownShard(ShardId),

    #[error("Failed to encode batch: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to deliver to {endpoint}: {source}")]
    Transport {
        endpoint: LeaderEndpoint,
        #[source]
        source: TransportError,
    },
}

/// Per-shard delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardSendStats {
    pub batches: u64,
    pub transactions: u64,
    pub failures: u64,
}

/// Point-in-time view of dispatch statistics.
#[derive(Clone, Debug, Default)]
pub struct DispatchSummary {
    pub per_shard: BTreeMap<ShardId, ShardSendStats>,
    pub stops_sent: u64,
    pub latency_samples: u64,
    pub latency_p50: Duration,
    pub latency_p99: Duration,
    pub latency_max: Duration,
}

impl DispatchSummary {
    /// Transactions delivered across all shards.
    pub fn transactions(&self) -> u64 {
        self.per_shard.values().map(|s| s.transactions).sum()
    }

    pub fn failures(&self) -> u64 {
        self.per_shard.values().map(|s| s.failures).sum()
    }
}

#[derive(Debug)]
struct StatsInner {
    per_shard: BTreeMap<ShardId, ShardSendStats>,
    stops_sent: u64,
    /// Send latency in microseconds.
    latency: Histogram<u64>,
}

/// Shared dispatch statistics.
#[derive(Debug)]
pub struct DispatchStats {
    inner: Mutex<StatsInner>,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                per_shard: BTreeMap::new(),
                stops_sent: 0,
                latency: Histogram::new(3).expect("3 significant figures is a valid precision"),
            }),
        }
    }

    fn record_success(&self, shard: ShardId, transactions: usize, elapsed: Duration) {
        let mut inner = self.inner.lock();
        let entry = inner.per_shard.entry(shard).or_default();
        entry.batches += 1;
        entry.transactions += transactions as u64;
        inner
            .latency
            .saturating_record(elapsed.as_micros().min(u64::MAX as u128) as u64);
    }

    fn record_failure(&self, shard: ShardId) {
        self.inner.lock().per_shard.entry(shard).or_default().failures += 1;
    }

    fn record_stops(&self, delivered: usize) {
        self.inner.lock().stops_sent += delivered as u64;
    }

    pub fn summary(&self) -> DispatchSummary {
        let inner = self.inner.lock();
        let micros = |v: u64| Duration::from_micros(v);
        DispatchSummary {
            per_shard: inner.per_shard.clone(),
            stops_sent: inner.stops_sent,
            latency_samples: inner.latency.len(),
            latency_p50: micros(inner.latency.value_at_quantile(0.5)),
            latency_p99: micros(inner.latency.value_at_quantile(0.99)),
            latency_max: micros(inner.latency.max()),
        }
    }
}

/// Sends encoded batches to shard leaders.
///
/// Delivery is fire-and-forget: failures are logged and counted, never
/// retried.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    leaders: Arc<LeaderMap>,
    stats: Arc<DispatchStats>,
    in_flight: TaskTracker,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, leaders: Arc<LeaderMap>) -> Self {
        Self {
            transport,
            leaders,
            stats: Arc::new(DispatchStats::new()),
            in_flight: TaskTracker::new(),
        }
    }

    pub fn leaders(&self) -> &LeaderMap {
        &self.leaders
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Encode and deliver one batch to `shard`'s leader.
    ///
    /// Returns the number of transactions sent.
    pub async fn send(&self, shard: ShardId, batch: TxBatch) -> Result<usize, DispatchError> {
        let endpoint = self
            .leaders
            .get(shard)
            .ok_or(DispatchError::UnknownShard(shard))?;
        let count = batch.len();
        let payload = Bytes::from(encode_transaction_list(batch)?);

        let started = Instant::now();
        let result = self.transport.send(endpoint, payload).await;
        match result {
            Ok(()) => {
                let elapsed = started.elapsed();
                self.stats.record_success(shard, count, elapsed);
                debug!(shard = shard.0, txs = count, ?elapsed, "Batch delivered");
                Ok(count)
            }
            Err(source) => {
                self.stats.record_failure(shard);
                Err(DispatchError::Transport {
                    endpoint: endpoint.clone(),
                    source,
                })
            }
        }
    }

    /// Send each batch concurrently on its own task.
    ///
    /// Failures are logged; callers may await the handles or let them run.
    pub fn dispatch(&self, batches: BTreeMap<ShardId, TxBatch>) -> Vec<JoinHandle<()>> {
        batches
            .into_iter()
            .map(|(shard, batch)| {
                let dispatcher = self.clone();
                self.in_flight.spawn(async move {
                    if let Err(e) = dispatcher.send(shard, batch).await {
                        warn!(shard = shard.0, error = %e, "Batch dispatch failed");
                    }
                })
            })
            .collect()
    }

    /// Wait until every batch spawned by [`Self::dispatch`] has finished.
    pub async fn wait_idle(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }

    /// Send one stop message to every leader.
    ///
    /// Returns the number of leaders that accepted it.
    pub async fn broadcast_stop(&self) -> Result<usize, DispatchError> {
        let payload = Bytes::from(encode_stop_message()?);
        let endpoints: Vec<LeaderEndpoint> = self.leaders.endpoints().cloned().collect();
        let results = self.transport.broadcast(&endpoints, payload).await;

        let mut delivered = 0;
        for (endpoint, result) in endpoints.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(leader = %endpoint, error = %e, "Failed to send stop"),
            }
        }
        self.stats.record_stops(delivered);
        info!(delivered, leaders = endpoints.len(), "Stop broadcast");
        Ok(delivered)
    }
}
