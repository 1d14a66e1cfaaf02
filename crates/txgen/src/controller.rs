//! Generation loop controller.
//!
//! Drives a run through `Warmup -> Running -> Draining -> Stopped`:
//!
//! - **Warmup** waits a fixed delay so leaders can connect.
//! - **Running** generates until the deadline. The account model generates
//!   for one shard each time that shard signals readiness. The UTXO model
//!   generates for every shard at once on a fixed period, cycling through
//!   address subsets.
//! - **Draining** broadcasts a stop message to every leader as soon as it
//!   begins, then lets in-flight batches finish within a grace period.
//! - **Stopped** follows once the grace period ends.
//!
//! The deadline is only checked between rounds; a round that has started
//! always completes.

use crate::batches::ShardBatches;
use crate::config::{TransactionModel, TxgenConfig};
use crate::dispatch::Dispatcher;
use crate::mirror::MirrorSet;
use crate::readiness::{ReadinessReceiver, ReadinessSender};
use crate::settings::Settings;
use crate::tracker::CrossShardTracker;
use crate::workloads::{RoundSpends, UtxoRound};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};
use txgen_types::{ShardId, Transaction, TxBatch};

/// Controller lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Warmup,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Warmup => "warmup",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Totals for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerSummary {
    pub rounds: u64,
    pub generated: u64,
    pub cross_shard_recorded: u64,
    /// Transactions refused by batch admission.
    pub dropped: u64,
    /// UTXO spends discarded because an input was already spent that round.
    pub conflicts: u64,
    pub stops_delivered: usize,
}

/// Runs the generation loop.
pub struct Controller {
    config: TxgenConfig,
    settings: Settings,
    mirrors: MirrorSet,
    dispatcher: Dispatcher,
    tracker: Arc<CrossShardTracker>,
    readiness: ReadinessSender,
    phase: watch::Sender<Phase>,
    summary: ControllerSummary,
}

impl Controller {
    pub fn new(
        config: TxgenConfig,
        mirrors: MirrorSet,
        dispatcher: Dispatcher,
        tracker: Arc<CrossShardTracker>,
        readiness: ReadinessSender,
        phase: watch::Sender<Phase>,
    ) -> Self {
        let settings = config.settings(dispatcher.leaders());
        Self {
            config,
            settings,
            mirrors,
            dispatcher,
            tracker,
            readiness,
            phase,
            summary: ControllerSummary::default(),
        }
    }

    /// Observe phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        info!(from = %previous, to = %phase, "Controller phase change");
    }

    /// Run to completion.
    pub async fn run(mut self, readiness: ReadinessReceiver) -> ControllerSummary {
        self.set_phase(Phase::Warmup);
        sleep(self.config.warmup).await;

        let start = Instant::now();
        let deadline = self.config.duration.map(|duration| start + duration);
        self.set_phase(Phase::Running);

        match self.config.model {
            TransactionModel::Account => self.run_account(readiness, deadline).await,
            TransactionModel::Utxo => self.run_utxo(deadline).await,
        }

        debug!(elapsed = ?start.elapsed(), "Generator timer ended");
        self.set_phase(Phase::Draining);
        self.drain().await;
        self.set_phase(Phase::Stopped);
        self.summary
    }

    async fn run_account(&mut self, mut readiness: ReadinessReceiver, deadline: Option<Instant>) {
        // Every shard gets one round before any block arrives.
        for shard in self.mirrors.shards() {
            self.readiness.signal(shard);
        }

        loop {
            if expired(deadline) {
                break;
            }
            let shard = tokio::select! {
                shard = readiness.recv() => match shard {
                    Some(shard) => shard,
                    None => break,
                },
                _ = until(deadline) => break,
            };
            self.account_round(shard).await;
        }
    }

    async fn account_round(&mut self, shard: ShardId) {
        let Some(mirror) = self.mirrors.get(shard) else {
            debug!(shard = shard.0, "No mirror for ready shard");
            return;
        };
        self.summary.rounds += 1;
        info!(round = self.summary.rounds, shard = shard.0, "Starting account round");

        let txs = match mirror.generate_account().await {
            Ok(txs) => txs,
            Err(e) => {
                warn!(shard = shard.0, error = %e, "Account generation failed");
                return;
            }
        };
        self.summary.generated += txs.len() as u64;

        let mut batches = self.new_batches();
        let mut cross = Vec::new();
        for tx in txs {
            if tx.is_cross_shard() {
                if batches.push_cross(tx.clone()) {
                    cross.push(tx);
                }
            } else {
                batches.push_intra(shard, tx);
            }
        }

        self.finish_round(batches, &cross);
    }

    async fn run_utxo(&mut self, deadline: Option<Instant>) {
        let total_subsets = self.config.num_subset;
        let mut subset_counter = 0usize;

        loop {
            if expired(deadline) {
                break;
            }
            self.summary.rounds += 1;
            info!(
                round = self.summary.rounds,
                subset = subset_counter % total_subsets.max(1),
                "Starting UTXO round"
            );

            // Barrier: every shard's generation finishes before merging.
            let rounds = futures::future::join_all(self.mirrors.iter().map(|mirror| async move {
                (
                    mirror.shard(),
                    mirror.generate_utxo(subset_counter, total_subsets).await,
                )
            }))
            .await;

            let mut batches = self.new_batches();
            let mut spends = RoundSpends::new();
            let mut cross = Vec::new();
            let mut intra: Vec<(ShardId, UtxoRound)> = Vec::with_capacity(rounds.len());
            for (shard, result) in rounds {
                match result {
                    Ok(mut round) => {
                        self.summary.generated += round.len() as u64;
                        for tx in round.cross.drain(..) {
                            if !spends.is_free(&tx) {
                                self.summary.conflicts += 1;
                            } else if batches.push_cross(tx.clone()) {
                                spends.claim(&tx);
                                cross.push(tx);
                            }
                        }
                        intra.push((shard, round));
                    }
                    Err(e) => warn!(shard = shard.0, error = %e, "UTXO generation failed"),
                }
            }
            for (shard, round) in intra {
                for tx in round.intra {
                    if !spends.is_free(&tx) {
                        self.summary.conflicts += 1;
                    } else if batches.push_intra(shard, tx.clone()) {
                        spends.claim(&tx);
                    }
                }
            }

            self.finish_round(batches, &cross);
            subset_counter = subset_counter.wrapping_add(1);

            tokio::select! {
                _ = sleep(self.config.round_interval) => {}
                _ = until(deadline) => {}
            }
        }
    }

    fn new_batches<T: Transaction + Clone>(&self) -> ShardBatches<T> {
        ShardBatches::new(
            self.dispatcher.leaders().shards(),
            self.settings.max_num_txs_per_batch,
        )
    }

    /// Record admitted cross-shard transactions and send the batches.
    fn finish_round<T>(&mut self, batches: ShardBatches<T>, cross: &[T])
    where
        T: Transaction + Clone,
        Vec<T>: Into<TxBatch>,
    {
        self.summary.dropped += batches.dropped() as u64;
        let recorded = self.tracker.record_all(cross, std::time::Instant::now());
        self.summary.cross_shard_recorded += recorded as u64;

        let batches = batches.into_batches();
        for (shard, batch) in &batches {
            if let Some(leader) = self.dispatcher.leaders().get(*shard) {
                debug!(leader = %leader, shard = shard.0, txs = batch.len(), "Sending batch");
            }
        }
        self.dispatcher.dispatch(batches);
    }

    /// Stop every leader, then give in-flight batches the rest of the grace
    /// period. The whole drain takes `drain_grace`.
    async fn drain(&mut self) {
        let deadline = Instant::now() + self.config.drain_grace;

        match self.dispatcher.broadcast_stop().await {
            Ok(delivered) => self.summary.stops_delivered = delivered,
            Err(e) => warn!(error = %e, "Failed to broadcast stop"),
        }

        if timeout_at(deadline, self.dispatcher.wait_idle())
            .await
            .is_err()
        {
            warn!("Batches still in flight at shutdown");
        }
        sleep_until(deadline).await;
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Resolves at the deadline, or never without one.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
