//! Process configuration.
//!
//! [`TxgenConfig`] carries the run parameters the binary builds from its
//! command line. [`LeaderDirectory`] is the static shard-to-leader map plus
//! the client's own listen address, loaded once from a TOML file:
//!
//! ```toml
//! [client]
//! address = "127.0.0.1:9999"
//!
//! [[leaders]]
//! shard = 0
//! address = "127.0.0.1:9000"
//! public_key = "ab01cd23"
//! ```

use crate::settings::{Settings, DEFAULT_CROSS_SHARD_RATIO, DEFAULT_MAX_NUM_TXS_PER_BATCH};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use txgen_types::{HexError, LeaderEndpoint, LeaderMap, PeerPublicKey, ShardId};

/// Default number of UTXO address subsets.
pub const DEFAULT_NUM_SUBSET: usize = 3;

/// Default delay before generation starts.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);

/// Default UTXO round period.
pub const DEFAULT_ROUND_INTERVAL: Duration = Duration::from_secs(10);

/// Default wait after the stop broadcast.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(3);

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse leader directory: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Leader directory has no [client] section")]
    MissingClient,

    #[error("Leader directory lists no leaders")]
    EmptyLeaderMap,

    #[error("Duplicate leader entry for {0}")]
    DuplicateShard(ShardId),

    #[error("Invalid public key for {shard}: {source}")]
    InvalidPublicKey {
        shard: ShardId,
        #[source]
        source: HexError,
    },

    #[error("Subset count must be at least 1")]
    InvalidSubsetCount,

    #[error("Batch cap must be at least 1")]
    InvalidBatchCap,
}

/// Which transaction model to generate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionModel {
    #[default]
    Account,
    Utxo,
}

/// Run parameters.
#[derive(Clone, Debug)]
pub struct TxgenConfig {
    pub model: TransactionModel,
    /// How long to generate for; `None` runs until the process is stopped.
    pub duration: Option<Duration>,
    /// Number of address subsets the UTXO model cycles through.
    pub num_subset: usize,
    pub max_num_txs_per_batch: usize,
    /// Percentage of generated transactions that are cross-shard.
    pub cross_shard_ratio: u8,
    /// Synthetic addresses per shard.
    pub num_of_address: usize,
    pub warmup: Duration,
    pub round_interval: Duration,
    pub drain_grace: Duration,
    pub seed: u64,
}

impl Default for TxgenConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            model: TransactionModel::default(),
            duration: None,
            num_subset: DEFAULT_NUM_SUBSET,
            max_num_txs_per_batch: DEFAULT_MAX_NUM_TXS_PER_BATCH,
            cross_shard_ratio: DEFAULT_CROSS_SHARD_RATIO,
            num_of_address: settings.num_of_address,
            warmup: DEFAULT_WARMUP,
            round_interval: DEFAULT_ROUND_INTERVAL,
            drain_grace: DEFAULT_DRAIN_GRACE,
            seed: 0,
        }
    }
}

impl TxgenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: TransactionModel) -> Self {
        self.model = model;
        self
    }

    /// Set the run duration; `None` is unbounded.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_num_subset(mut self, num_subset: usize) -> Self {
        self.num_subset = num_subset;
        self
    }

    pub fn with_max_num_txs_per_batch(mut self, max: usize) -> Self {
        self.max_num_txs_per_batch = max;
        self
    }

    /// Set the cross-shard percentage, clamped to 100.
    pub fn with_cross_shard_ratio(mut self, ratio: u8) -> Self {
        self.cross_shard_ratio = ratio.min(100);
        self
    }

    pub fn with_num_of_address(mut self, num: usize) -> Self {
        self.num_of_address = num;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_round_interval(mut self, interval: Duration) -> Self {
        self.round_interval = interval;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_subset == 0 {
            return Err(ConfigError::InvalidSubsetCount);
        }
        if self.max_num_txs_per_batch == 0 {
            return Err(ConfigError::InvalidBatchCap);
        }
        Ok(())
    }

    /// Generator settings for a topology.
    ///
    /// Cross-shard generation is enabled only when there is more than one
    /// shard.
    pub fn settings(&self, leaders: &LeaderMap) -> Settings {
        Settings::for_leaders(leaders)
            .with_num_of_address(self.num_of_address)
            .with_max_num_txs_per_batch(self.max_num_txs_per_batch)
            .with_cross_shard_ratio(self.cross_shard_ratio)
    }
}

/// Convert a duration given in whole seconds; non-positive means unbounded.
pub fn duration_from_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    client: Option<ClientSection>,
    #[serde(default)]
    leaders: Vec<LeaderEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    address: SocketAddr,
}

#[derive(Debug, Deserialize)]
struct LeaderEntry {
    shard: u32,
    address: SocketAddr,
    public_key: String,
}

/// Static leader directory and client endpoint.
#[derive(Clone, Debug)]
pub struct LeaderDirectory {
    /// Address the client listens on for block announcements.
    pub client: SocketAddr,
    pub leaders: LeaderMap,
}

impl LeaderDirectory {
    /// Load and validate a directory file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse and validate directory TOML.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let file: DirectoryFile = toml::from_str(contents)?;
        let client = file.client.ok_or(ConfigError::MissingClient)?;
        if file.leaders.is_empty() {
            return Err(ConfigError::EmptyLeaderMap);
        }

        let mut seen = BTreeSet::new();
        let mut leaders = Vec::with_capacity(file.leaders.len());
        for entry in file.leaders {
            let shard = ShardId(entry.shard);
            if !seen.insert(shard) {
                return Err(ConfigError::DuplicateShard(shard));
            }
            let public_key = PeerPublicKey::from_hex(&entry.public_key)
                .map_err(|source| ConfigError::InvalidPublicKey { shard, source })?;
            leaders.push((shard, LeaderEndpoint::new(entry.address, public_key)));
        }

        Ok(Self {
            client: client.address,
            leaders: LeaderMap::new(leaders),
        })
    }

    /// Replace the client listen address.
    pub fn with_client(mut self, client: SocketAddr) -> Self {
        self.client = client;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DIRECTORY: &str = r#"
        [client]
        address = "127.0.0.1:9999"

        [[leaders]]
        shard = 1
        address = "127.0.0.1:9001"
        public_key = "ab01"

        [[leaders]]
        shard = 0
        address = "127.0.0.1:9000"
        public_key = "cd23"
    "#;

    #[test]
    fn test_parse_directory() {
        let directory = LeaderDirectory::parse(DIRECTORY).unwrap();
        assert_eq!(directory.client, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(directory.leaders.len(), 2);
        assert_eq!(
            directory.leaders.shards().collect::<Vec<_>>(),
            vec![ShardId(0), ShardId(1)]
        );
        let leader = directory.leaders.get(ShardId(1)).unwrap();
        assert_eq!(leader.public_key.to_hex(), "ab01");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DIRECTORY.as_bytes()).unwrap();
        let directory = LeaderDirectory::load(file.path()).unwrap();
        assert_eq!(directory.leaders.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = LeaderDirectory::load(Path::new("/nonexistent/leaders.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_missing_client() {
        let err = LeaderDirectory::parse(
            r#"
            [[leaders]]
            shard = 0
            address = "127.0.0.1:9000"
            public_key = "00"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingClient));
    }

    #[test]
    fn test_empty_leaders() {
        let err = LeaderDirectory::parse("[client]\naddress = \"127.0.0.1:1\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyLeaderMap));
    }

    #[test]
    fn test_duplicate_shard() {
        let contents = format!(
            "{DIRECTORY}\n[[leaders]]\nshard = 0\naddress = \"127.0.0.1:9005\"\npublic_key = \"ff\"\n"
        );
        let err = LeaderDirectory::parse(&contents).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateShard(ShardId(0))));
    }

    #[test]
    fn test_invalid_public_key() {
        let contents = DIRECTORY.replace("cd23", "xyz");
        let err = LeaderDirectory::parse(&contents).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPublicKey {
                shard: ShardId(0),
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let err = LeaderDirectory::parse("[client\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_duration_from_secs() {
        assert_eq!(duration_from_secs(10), Some(Duration::from_secs(10)));
        assert_eq!(duration_from_secs(0), None);
        assert_eq!(duration_from_secs(-1), None);
    }

    #[test]
    fn test_validate() {
        assert!(TxgenConfig::new().validate().is_ok());
        assert!(matches!(
            TxgenConfig::new().with_num_subset(0).validate(),
            Err(ConfigError::InvalidSubsetCount)
        ));
        assert!(matches!(
            TxgenConfig::new().with_max_num_txs_per_batch(0).validate(),
            Err(ConfigError::InvalidBatchCap)
        ));
    }

    #[test]
    fn test_settings_follow_topology() {
        let config = TxgenConfig::new().with_cross_shard_ratio(250);
        assert_eq!(config.cross_shard_ratio, 100);

        let single = LeaderDirectory::parse(
            r#"
            [client]
            address = "127.0.0.1:9999"
            [[leaders]]
            shard = 0
            address = "127.0.0.1:9000"
            public_key = "00"
            "#,
        )
        .unwrap();
        assert!(!config.settings(&single.leaders).cross_shard);

        let double = LeaderDirectory::parse(DIRECTORY).unwrap();
        assert!(config.settings(&double.leaders).cross_shard);
    }
}
