//! Per-shard mirror service.
//!
//! Each shard's mirror is owned by one task. Block updates and generation
//! requests reach it over a channel, so a shard's mirror is never updated
//! and read for generation at the same time. After every applied block the
//! task publishes an immutable snapshot that other shards' generators read
//! without coordination.

use super::{MirrorError, ShardMirror, DEFAULT_GENESIS_BALANCE};
use crate::settings::Settings;
use crate::workloads::{AccountWorkload, UtxoRound, UtxoWorkload};
use arc_swap::ArcSwap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use txgen_types::{AccountBlock, AccountTransaction, Block, LeaderMap, ShardId};

/// Requests queued per shard before senders wait.
const MIRROR_QUEUE_DEPTH: usize = 64;

enum MirrorRequest {
    Apply {
        block: Block,
        account: Option<AccountBlock>,
        reply: oneshot::Sender<Result<usize, MirrorError>>,
    },
    GenerateAccount {
        reply: oneshot::Sender<Vec<AccountTransaction>>,
    },
    GenerateUtxo {
        subset_index: usize,
        total_subsets: usize,
        reply: oneshot::Sender<UtxoRound>,
    },
}

/// Handle to one shard's mirror service.
#[derive(Clone)]
pub struct MirrorHandle {
    shard: ShardId,
    requests: mpsc::Sender<MirrorRequest>,
    snapshot: Arc<ArcSwap<ShardMirror>>,
}

impl MirrorHandle {
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Latest published state of the mirror.
    pub fn snapshot(&self) -> Arc<ShardMirror> {
        self.snapshot.load_full()
    }

    /// Apply a block and wait until the mirror has taken it.
    ///
    /// Returns the number of transactions applied. On error the mirror is
    /// left as it was before the block.
    pub async fn apply(
        &self,
        block: Block,
        account: Option<AccountBlock>,
    ) -> Result<usize, MirrorError> {
        let (reply, rx) = oneshot::channel();
        self.request(MirrorRequest::Apply {
            block,
            account,
            reply,
        })
        .await?;
        rx.await.map_err(|_| MirrorError::ServiceStopped(self.shard))?
    }

    /// Generate an account-model batch originating in this shard.
    pub async fn generate_account(&self) -> Result<Vec<AccountTransaction>, MirrorError> {
        let (reply, rx) = oneshot::channel();
        self.request(MirrorRequest::GenerateAccount { reply }).await?;
        rx.await.map_err(|_| MirrorError::ServiceStopped(self.shard))
    }

    /// Generate one UTXO round for the given address subset.
    pub async fn generate_utxo(
        &self,
        subset_index: usize,
        total_subsets: usize,
    ) -> Result<UtxoRound, MirrorError> {
        let (reply, rx) = oneshot::channel();
        self.request(MirrorRequest::GenerateUtxo {
            subset_index,
            total_subsets,
            reply,
        })
        .await?;
        rx.await.map_err(|_| MirrorError::ServiceStopped(self.shard))
    }

    async fn request(&self, request: MirrorRequest) -> Result<(), MirrorError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| MirrorError::ServiceStopped(self.shard))
    }
}

/// Mirror services for every shard with a leader.
#[derive(Clone)]
pub struct MirrorSet {
    handles: BTreeMap<ShardId, MirrorHandle>,
}

impl MirrorSet {
    /// Spawn one service per leader shard, each seeded with a funded
    /// genesis address pool of `settings.num_of_address` addresses.
    pub fn spawn(leaders: &LeaderMap, settings: Settings, seed: u64) -> Self {
        let mirrors = leaders.shards().map(|shard| {
            ShardMirror::with_testing_addresses(
                shard,
                settings.num_of_address,
                DEFAULT_GENESIS_BALANCE,
            )
        });
        Self::from_mirrors(mirrors, settings, seed)
    }

    /// Spawn services over pre-built mirrors.
    ///
    /// Each shard's generator RNG is seeded from `seed` and the shard ID.
    pub fn from_mirrors(
        mirrors: impl IntoIterator<Item = ShardMirror>,
        settings: Settings,
        seed: u64,
    ) -> Self {
        let mirrors: Vec<ShardMirror> = mirrors.into_iter().collect();
        let snapshots: Vec<(ShardId, Arc<ArcSwap<ShardMirror>>)> = mirrors
            .iter()
            .map(|mirror| {
                (
                    mirror.shard(),
                    Arc::new(ArcSwap::from_pointee(mirror.clone())),
                )
            })
            .collect();

        let mut handles = BTreeMap::new();
        for (mirror, (shard, snapshot)) in mirrors.into_iter().zip(snapshots.iter()) {
            let peers = snapshots
                .iter()
                .filter(|(peer, _)| peer != shard)
                .map(|(_, snapshot)| snapshot.clone())
                .collect();
            let (tx, rx) = mpsc::channel(MIRROR_QUEUE_DEPTH);

            info!(
                shard = shard.0,
                pool_size = mirror.pool_size(),
                utxos = mirror.utxos().len(),
                "Starting mirror service"
            );

            let service = MirrorService {
                state: mirror,
                snapshot: snapshot.clone(),
                peers,
                settings,
                rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(u64::from(shard.0))),
                account: AccountWorkload::new(),
                utxo: UtxoWorkload::new(),
            };
            tokio::spawn(service.run(rx));

            handles.insert(
                *shard,
                MirrorHandle {
                    shard: *shard,
                    requests: tx,
                    snapshot: snapshot.clone(),
                },
            );
        }

        Self { handles }
    }

    pub fn get(&self, shard: ShardId) -> Option<&MirrorHandle> {
        self.handles.get(&shard)
    }

    pub fn contains(&self, shard: ShardId) -> bool {
        self.handles.contains_key(&shard)
    }

    pub fn shards(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.handles.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MirrorHandle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

struct MirrorService {
    state: ShardMirror,
    snapshot: Arc<ArcSwap<ShardMirror>>,
    peers: Vec<Arc<ArcSwap<ShardMirror>>>,
    settings: Settings,
    rng: ChaCha8Rng,
    account: AccountWorkload,
    utxo: UtxoWorkload,
}

impl MirrorService {
    async fn run(mut self, mut requests: mpsc::Receiver<MirrorRequest>) {
        while let Some(request) = requests.recv().await {
            self.handle(request);
        }
        debug!(shard = self.state.shard().0, "Mirror service stopped");
    }

    fn handle(&mut self, request: MirrorRequest) {
        match request {
            MirrorRequest::Apply {
                block,
                account,
                reply,
            } => {
                let result = self.state.apply_block(&block, account.as_ref());
                if result.is_ok() {
                    self.snapshot.store(Arc::new(self.state.clone()));
                }
                let _ = reply.send(result);
            }
            MirrorRequest::GenerateAccount { reply } => {
                let peers = self.peer_snapshots();
                let batch = self
                    .account
                    .generate(&self.state, &peers, &self.settings, &mut self.rng)
                    .unwrap_or_else(|e| {
                        warn!(shard = self.state.shard().0, error = %e, "Account generation failed");
                        Vec::new()
                    });
                let _ = reply.send(batch);
            }
            MirrorRequest::GenerateUtxo {
                subset_index,
                total_subsets,
                reply,
            } => {
                let peers = self.peer_snapshots();
                let round = self
                    .utxo
                    .generate(
                        subset_index,
                        total_subsets,
                        &self.state,
                        &peers,
                        &self.settings,
                        &mut self.rng,
                    )
                    .unwrap_or_else(|e| {
                        warn!(shard = self.state.shard().0, error = %e, "UTXO generation failed");
                        UtxoRound::default()
                    });
                let _ = reply.send(round);
            }
        }
    }

    /// Peer states are loaded once per request so a round sees a fixed view.
    fn peer_snapshots(&self) -> Vec<Arc<ShardMirror>> {
        self.peers.iter().map(|peer| peer.load_full()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txgen_types::{
        BlockHeight, Hash, LeaderEndpoint, PeerPublicKey, TxInput, TxOutput, UtxoTransaction,
    };

    fn two_shards(pool: usize) -> MirrorSet {
        MirrorSet::from_mirrors(
            [
                ShardMirror::with_testing_addresses(ShardId(0), pool, 1_000),
                ShardMirror::with_testing_addresses(ShardId(1), pool, 1_000),
            ],
            Settings::default().with_cross_shard(true),
            7,
        )
    }

    fn spend_first(mirror: &ShardMirror) -> Block {
        let (outpoint, utxo) = mirror
            .utxos()
            .iter()
            .next()
            .map(|(outpoint, utxo)| (*outpoint, *utxo))
            .unwrap();
        let tx = UtxoTransaction::new(
            vec![TxInput {
                outpoint,
                shard: mirror.shard(),
            }],
            vec![TxOutput {
                owner: utxo.owner,
                shard: mirror.shard(),
                value: utxo.value,
            }],
        );
        Block {
            shard_id: mirror.shard(),
            height: BlockHeight(1),
            hash: Hash::from_bytes(b"block-1"),
            parent_hash: Hash::ZERO,
            transactions: vec![tx],
            account_payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_apply_publishes_snapshot() {
        let set = two_shards(4);
        let handle = set.get(ShardId(0)).unwrap();
        let before = handle.snapshot();

        let applied = handle.apply(spend_first(&before), None).await.unwrap();
        assert_eq!(applied, 1);

        let after = handle.snapshot();
        assert_eq!(after.height(), BlockHeight(1));
        assert_eq!(after.blocks_applied(), 1);
        // Earlier snapshots are immutable.
        assert_eq!(before.blocks_applied(), 0);
    }

    #[tokio::test]
    async fn test_service_survives_max_nonce_block() {
        let set = two_shards(4);
        let handle = set.get(ShardId(0)).unwrap();
        let from = handle.snapshot().pool_address(0);
        let to = handle.snapshot().pool_address(1);
        let account = AccountBlock {
            shard_id: ShardId(0),
            height: BlockHeight(1),
            parent_hash: Hash::ZERO,
            transactions: vec![AccountTransaction::new(
                from,
                ShardId(0),
                to,
                ShardId(0),
                1,
                u64::MAX,
            )],
        };
        let mut block = spend_first(&handle.snapshot());
        block.transactions.clear();

        assert_eq!(handle.apply(block, Some(account)).await.unwrap(), 1);
        assert_eq!(handle.snapshot().account(&from).unwrap().nonce, u64::MAX);
        assert_eq!(handle.generate_account().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_generation_reads_peer_snapshots() {
        let set = two_shards(10);
        let txs = set.get(ShardId(0)).unwrap().generate_account().await.unwrap();
        assert_eq!(txs.len(), 10);
        assert!(txs.iter().all(|tx| tx.from_shard == ShardId(0)));

        let round = set.get(ShardId(1)).unwrap().generate_utxo(0, 1).await.unwrap();
        assert_eq!(round.len(), 10);
    }

    #[tokio::test]
    async fn test_spawn_funds_every_leader_shard() {
        let leaders = LeaderMap::new((0..3).map(|shard| {
            let addr = format!("127.0.0.1:{}", 9000 + shard).parse().unwrap();
            (
                ShardId(shard),
                LeaderEndpoint::new(
                    addr,
                    PeerPublicKey::for_address(&addr),
                ),
            )
        }));
        let set = MirrorSet::spawn(&leaders, Settings::default().with_num_of_address(5), 0);

        assert_eq!(set.len(), 3);
        for handle in set.iter() {
            let snapshot = handle.snapshot();
            assert_eq!(snapshot.pool_size(), 5);
            assert_eq!(snapshot.utxos().len(), 5);
        }
    }
}
