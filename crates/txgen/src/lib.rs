//! Synthetic transaction generator for sharded test networks.
//!
//! The generator keeps a rough local mirror of every shard's ledger, builds
//! plausible transactions against it, and streams batches to each shard's
//! leader. Blocks announced by the leaders flow back into the mirrors and
//! trigger further rounds.
//!
//! # Architecture
//!
//! - [`mirror`]: one task per shard owning that shard's mirror
//! - [`workloads`]: account-model and UTXO-model generators
//! - [`listener`]: applies announced blocks and signals readiness
//! - [`controller`]: the warmup/running/draining/stopped loop
//! - [`dispatch`]: fire-and-forget delivery to leaders
//! - [`tracker`]: in-flight cross-shard transactions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use txgen::{Txgen, TxgenConfig};
//! use txgen_network::TcpTransport;
//! use txgen_types::LeaderMap;
//!
//! # async fn example(leaders: LeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let txgen = Txgen::new(TxgenConfig::new(), leaders, Arc::new(TcpTransport::default()))?;
//! let (_blocks_tx, blocks_rx) = mpsc::channel(64);
//! let report = txgen.run(blocks_rx).await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod batches;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod listener;
pub mod mirror;
pub mod readiness;
pub mod report;
pub mod settings;
pub mod tracker;
pub mod workloads;

pub use config::{ConfigError, LeaderDirectory, TransactionModel, TxgenConfig};
pub use controller::{Controller, Phase};
pub use report::RunReport;
pub use settings::Settings;

use dispatch::Dispatcher;
use listener::BlockListener;
use mirror::MirrorSet;
use readiness::readiness_channel;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use tracker::CrossShardTracker;
use txgen_network::Transport;
use txgen_types::{Block, LeaderMap};

/// A configured generator run.
pub struct Txgen {
    config: TxgenConfig,
    leaders: Arc<LeaderMap>,
    transport: Arc<dyn Transport>,
    phase: watch::Sender<Phase>,
}

impl Txgen {
    /// Validate the configuration and topology.
    pub fn new(
        config: TxgenConfig,
        leaders: LeaderMap,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if leaders.is_empty() {
            return Err(ConfigError::EmptyLeaderMap);
        }
        let (phase, _) = watch::channel(Phase::Warmup);
        Ok(Self {
            config,
            leaders: Arc::new(leaders),
            transport,
            phase,
        })
    }

    /// Observe the controller's phase.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Run the generator, consuming block announcements from `blocks`.
    pub async fn run(self, blocks: mpsc::Receiver<Vec<Block>>) -> RunReport {
        for (shard, leader) in self.leaders.iter() {
            debug!(shard = shard.0, leader = %leader, "Leader");
        }

        let settings = self.config.settings(&self.leaders);
        info!(
            shards = self.leaders.len(),
            model = ?self.config.model,
            cross_shard = settings.cross_shard,
            cross_shard_ratio = settings.cross_shard_ratio,
            max_num_txs_per_batch = settings.max_num_txs_per_batch,
            duration = ?self.config.duration,
            "Starting transaction generator"
        );

        let mirrors = MirrorSet::spawn(&self.leaders, settings, self.config.seed);
        let tracker = Arc::new(CrossShardTracker::new());
        let (ready_tx, ready_rx) = readiness_channel(self.leaders.len());

        let listener = BlockListener::new(mirrors.clone(), ready_tx.clone(), tracker.clone());
        let listener_stats = listener.stats().clone();
        let listener_task = tokio::spawn(listener.run(blocks));

        let dispatcher = Dispatcher::new(self.transport, self.leaders);
        let controller = Controller::new(
            self.config,
            mirrors,
            dispatcher.clone(),
            tracker.clone(),
            ready_tx,
            self.phase,
        );
        let summary = controller.run(ready_rx).await;
        listener_task.abort();

        RunReport::new(
            summary,
            dispatcher.stats().summary(),
            &listener_stats,
            &tracker,
        )
    }
}
