//! Txgen CLI
//!
//! Generates synthetic transactions against a sharded test network and
//! sends them to each shard's leader.

use anyhow::Context;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use txgen::config::duration_from_secs;
use txgen::{LeaderDirectory, TransactionModel, Txgen, TxgenConfig};
use txgen_network::{BlockServer, TcpTransport, TransportConfig};

/// Block announcements buffered between the server and the listener.
const BLOCK_QUEUE_DEPTH: usize = 1024;

#[derive(Parser)]
#[command(name = "txgen")]
#[command(about = "Synthetic transaction generator for sharded test networks")]
#[command(version)]
struct Cli {
    /// Leader directory file
    #[arg(long, default_value = "local_config.toml")]
    config_file: PathBuf,

    /// Override the client listen IP from the directory file
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Override the client listen port from the directory file
    #[arg(long)]
    port: Option<u16>,

    /// Generate account-model transactions; `false` selects the UTXO model
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    account_model: bool,

    /// Maximum transactions sent to one shard per round
    #[arg(long, default_value = "20000")]
    max_num_txs_per_batch: usize,

    /// Number of address subsets the UTXO model cycles through
    #[arg(long, default_value = "3")]
    num_subset: usize,

    /// Generation time in seconds; zero or negative runs forever
    #[arg(long, default_value = "10", allow_negative_numbers = true)]
    duration: i64,

    /// Percentage of cross-shard transactions (0 to 100)
    #[arg(long, default_value = "30")]
    cross_shard_ratio: u8,

    /// Synthetic addresses per shard
    #[arg(long, default_value = "10000")]
    num_of_address: usize,

    /// Folder for txgen.log
    #[arg(long, default_value = "latest")]
    log_folder: PathBuf,

    /// Delay before generation starts (e.g., "5s")
    #[arg(long, default_value = "5s")]
    warmup: humantime::Duration,

    /// UTXO round period (e.g., "10s")
    #[arg(long, default_value = "10s")]
    round_interval: humantime::Duration,

    /// Wait after the stop broadcast (e.g., "3s")
    #[arg(long, default_value = "3s")]
    drain_grace: humantime::Duration,

    /// Timeout for connecting to a leader (e.g., "3s")
    #[arg(long, default_value = "3s")]
    connect_timeout: humantime::Duration,

    /// Timeout for writing one message to a leader (e.g., "10s")
    #[arg(long, default_value = "10s")]
    write_timeout: humantime::Duration,

    /// Seed for transaction generation
    #[arg(long, default_value = "0")]
    seed: u64,
}

/// Log to stdout and to `<log_folder>/txgen.log`.
fn init_tracing(log_folder: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_folder)
        .with_context(|| format!("failed to create log folder {}", log_folder.display()))?;
    let appender = tracing_appender::rolling::never(log_folder, "txgen.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.log_folder)?;

    let mut directory = LeaderDirectory::load(&cli.config_file)
        .with_context(|| format!("failed to load {}", cli.config_file.display()))?;
    if cli.ip.is_some() || cli.port.is_some() {
        let client = SocketAddr::new(
            cli.ip.unwrap_or(directory.client.ip()),
            cli.port.unwrap_or(directory.client.port()),
        );
        directory = directory.with_client(client);
    }

    let model = if cli.account_model {
        TransactionModel::Account
    } else {
        TransactionModel::Utxo
    };
    let config = TxgenConfig::new()
        .with_model(model)
        .with_duration(duration_from_secs(cli.duration))
        .with_num_subset(cli.num_subset)
        .with_max_num_txs_per_batch(cli.max_num_txs_per_batch)
        .with_cross_shard_ratio(cli.cross_shard_ratio)
        .with_num_of_address(cli.num_of_address)
        .with_warmup(cli.warmup.into())
        .with_round_interval(cli.round_interval.into())
        .with_drain_grace(cli.drain_grace.into())
        .with_seed(cli.seed);

    let transport_config = TransportConfig::default()
        .with_connect_timeout(cli.connect_timeout.into())
        .with_write_timeout(cli.write_timeout.into());
    let txgen = Txgen::new(
        config,
        directory.leaders,
        Arc::new(TcpTransport::new(transport_config.clone())),
    )?;

    let server = BlockServer::bind(directory.client, transport_config)
        .await
        .with_context(|| format!("failed to listen on {}", directory.client))?;
    let shutdown = CancellationToken::new();
    let (blocks_tx, blocks_rx) = mpsc::channel(BLOCK_QUEUE_DEPTH);
    let server_task = tokio::spawn(server.run(blocks_tx, shutdown.clone()));

    let report = txgen.run(blocks_rx).await;

    shutdown.cancel();
    let _ = server_task.await;
    println!("{report}");
    Ok(())
}
