//! UTXO-model spend generator.

use super::{random_pool_address, WorkloadError};
use crate::mirror::{ShardMirror, Utxo};
use crate::settings::Settings;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use txgen_types::{Address, Hash, OutPoint, TxInput, TxOutput, UtxoTransaction};

/// Bounded scan when looking for an unclaimed peer output.
const PEER_PICK_ATTEMPTS: usize = 8;

/// Whether `owner` falls in subset `subset_index` of `total_subsets`.
///
/// Subsets partition the address space, so every owner belongs to exactly
/// one subset and successive rounds cycle through all of them.
pub fn in_subset(owner: &Address, subset_index: usize, total_subsets: usize) -> bool {
    let total = total_subsets.max(1);
    owner.partition_key() as usize % total == subset_index % total
}

/// Outpoints already spent by transactions admitted this round.
///
/// Shards generate concurrently from snapshots of each other, so two of them
/// can pick the same peer output, and a cross-shard spend can take an output
/// its owning shard also spends locally. The merge step admits a spend only
/// if none of its inputs is already taken.
#[derive(Debug, Default)]
pub struct RoundSpends {
    spent: HashSet<OutPoint>,
}

impl RoundSpends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether none of `tx`'s inputs has been spent this round.
    pub fn is_free(&self, tx: &UtxoTransaction) -> bool {
        tx.inputs
            .iter()
            .all(|input| !self.spent.contains(&input.outpoint))
    }

    /// Mark every input of `tx` as spent.
    pub fn claim(&mut self, tx: &UtxoTransaction) {
        self.spent
            .extend(tx.inputs.iter().map(|input| input.outpoint));
    }

    pub fn len(&self) -> usize {
        self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.is_empty()
    }
}

/// One shard's output for a UTXO round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoRound {
    /// Spends whose inputs all live on the generating shard.
    pub intra: Vec<UtxoTransaction>,
    /// Spends that also consume an output on another shard.
    pub cross: Vec<UtxoTransaction>,
}

impl UtxoRound {
    pub fn len(&self) -> usize {
        self.intra.len() + self.cross.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intra.is_empty() && self.cross.is_empty()
    }
}

/// Generates UTXO-model spends for one shard.
#[derive(Clone, Debug, Default)]
pub struct UtxoWorkload;

impl UtxoWorkload {
    pub fn new() -> Self {
        Self
    }

    /// Spend outputs owned by subset `subset_index` of `mirror`'s addresses.
    ///
    /// At most `max_num_txs_per_batch` of the mirror's outputs are consumed.
    /// A cross-shard spend pairs one of them with an output of the same
    /// subset from a random peer; a peer output is used at most once per
    /// call. Peer snapshots are
    /// only read, so concurrent block updates cannot change what a round
    /// sees.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        subset_index: usize,
        total_subsets: usize,
        mirror: &ShardMirror,
        peers: &[Arc<ShardMirror>],
        settings: &Settings,
        rng: &mut R,
    ) -> Result<UtxoRound, WorkloadError> {
        let mut round = UtxoRound::default();
        let mut claimed: HashSet<OutPoint> = HashSet::new();

        let spendable = mirror
            .utxos()
            .iter()
            .filter(|(_, utxo)| in_subset(&utxo.owner, subset_index, total_subsets))
            .map(|(outpoint, utxo)| (*outpoint, *utxo))
            .take(settings.max_num_txs_per_batch);

        for (outpoint, utxo) in spendable {
            let own = TxInput {
                outpoint,
                shard: mirror.shard(),
            };

            if !peers.is_empty() && settings.roll_cross_shard(rng) {
                let peer = &peers[rng.gen_range(0..peers.len())];
                if let Some((peer_outpoint, peer_utxo)) = pick_peer_output(peer, subset_index, total_subsets, &claimed, rng) {
                    claimed.insert(peer_outpoint);
                    let foreign = TxInput {
                        outpoint: peer_outpoint,
                        shard: peer.shard(),
                    };
                    round.cross.push(cross_spend(
                        (own, utxo),
                        (foreign, peer_utxo),
                        mirror,
                        peer,
                        rng,
                    )?);
                    continue;
                }
            }

            round.intra.push(intra_spend(own, utxo, mirror, rng)?);
        }

        Ok(round)
    }
}

/// Pay part of an output to a random pool address and return the change.
fn intra_spend<R: Rng + ?Sized>(
    input: TxInput,
    utxo: Utxo,
    mirror: &ShardMirror,
    rng: &mut R,
) -> Result<UtxoTransaction, WorkloadError> {
    let shard = mirror.shard();
    let payee = random_pool_address(mirror, rng)?;

    let outputs = if utxo.value >= 2 {
        let amount = rng.gen_range(1..utxo.value);
        vec![
            TxOutput {
                owner: payee,
                shard,
                value: amount,
            },
            TxOutput {
                owner: utxo.owner,
                shard,
                value: utxo.value - amount,
            },
        ]
    } else {
        vec![TxOutput {
            owner: payee,
            shard,
            value: utxo.value,
        }]
    };

    Ok(UtxoTransaction::new(vec![input], outputs))
}

/// Spend one output from each shard; each value is paid out on the shard
/// its input came from.
fn cross_spend<R: Rng + ?Sized>(
    (own, own_utxo): (TxInput, Utxo),
    (foreign, foreign_utxo): (TxInput, Utxo),
    mirror: &ShardMirror,
    peer: &ShardMirror,
    rng: &mut R,
) -> Result<UtxoTransaction, WorkloadError> {
    let outputs = vec![
        TxOutput {
            owner: random_pool_address(mirror, rng)?,
            shard: own.shard,
            value: own_utxo.value,
        },
        TxOutput {
            owner: random_pool_address(peer, rng)?,
            shard: foreign.shard,
            value: foreign_utxo.value,
        },
    ];
    Ok(UtxoTransaction::new(vec![own, foreign], outputs))
}

/// Pick an unclaimed peer output in the round's subset, scanning from a
/// random key.
fn pick_peer_output<R: Rng + ?Sized>(
    peer: &ShardMirror,
    subset_index: usize,
    total_subsets: usize,
    claimed: &HashSet<OutPoint>,
    rng: &mut R,
) -> Option<(OutPoint, Utxo)> {
    if peer.utxos().is_empty() {
        return None;
    }

    let pivot = OutPoint::new(Hash::from_bytes(&rng.gen::<[u8; 32]>()), 0);
    peer.utxos()
        .range(pivot..)
        .chain(peer.utxos().iter())
        .filter(|(_, utxo)| in_subset(&utxo.owner, subset_index, total_subsets))
        .map(|(outpoint, utxo)| (*outpoint, *utxo))
        .take(PEER_PICK_ATTEMPTS)
        .find(|(outpoint, _)| !claimed.contains(outpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::DEFAULT_GENESIS_BALANCE;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;
    use txgen_types::{ShardId, Transaction};

    fn mirrors(num_shards: u32, pool: usize) -> Vec<Arc<ShardMirror>> {
        (0..num_shards)
            .map(|shard| {
                Arc::new(ShardMirror::with_testing_addresses(
                    ShardId(shard),
                    pool,
                    DEFAULT_GENESIS_BALANCE,
                ))
            })
            .collect()
    }

    #[test]
    fn test_subsets_partition_addresses() {
        for index in 0..200 {
            let address = Address::synthetic(ShardId(0), index);
            let hits = (0..3).filter(|s| in_subset(&address, *s, 3)).count();
            assert_eq!(hits, 1);
            // Subset index is taken modulo the subset count.
            assert_eq!(in_subset(&address, 4, 3), in_subset(&address, 1, 3));
        }
    }

    #[test]
    fn test_zero_subsets_treated_as_one() {
        let address = Address::synthetic(ShardId(2), 7);
        assert!(in_subset(&address, 0, 0));
        assert!(in_subset(&address, 5, 0));
    }

    #[test]
    fn test_intra_round_spends_only_subset_outputs() {
        let all = mirrors(1, 60);
        let settings = Settings::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let round = UtxoWorkload::new()
            .generate(1, 3, &all[0], &[], &settings, &mut rng)
            .unwrap();
        assert!(round.cross.is_empty());
        assert!(!round.intra.is_empty());

        for tx in &round.intra {
            assert!(!tx.is_cross_shard());
            let spent = all[0].utxo(&tx.inputs[0].outpoint).unwrap();
            assert!(in_subset(&spent.owner, 1, 3));
            assert_eq!(tx.total_output(), Some(spent.value));
        }
    }

    #[test]
    fn test_subset_cycle_covers_every_output() {
        let all = mirrors(1, 40);
        let settings = Settings::default();
        let workload = UtxoWorkload::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let mut spent = BTreeSet::new();
        for subset in 0..3 {
            let round = workload
                .generate(subset, 3, &all[0], &[], &settings, &mut rng)
                .unwrap();
            for tx in round.intra {
                assert!(spent.insert(tx.inputs[0].outpoint));
            }
        }
        assert_eq!(spent.len(), all[0].utxos().len());
    }

    #[test]
    fn test_cross_spends_touch_two_shards() {
        let all = mirrors(3, 30);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let round = UtxoWorkload::new()
            .generate(0, 1, &all[0], &all[1..], &settings, &mut rng)
            .unwrap();
        assert_eq!(round.len(), 30);
        assert!(!round.cross.is_empty());

        let mut foreign = HashSet::new();
        for tx in &round.cross {
            let shards = tx.input_shards();
            assert_eq!(shards.len(), 2);
            assert!(shards.contains(&ShardId(0)));
            assert!(foreign.insert(tx.inputs[1].outpoint));
            for output in &tx.outputs {
                assert!(shards.contains(&output.shard));
            }
        }
    }

    #[test]
    fn test_peer_inputs_stay_in_subset() {
        let all = mirrors(3, 90);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(21);

        let round = UtxoWorkload::new()
            .generate(2, 3, &all[0], &all[1..], &settings, &mut rng)
            .unwrap();
        assert!(!round.cross.is_empty());

        for tx in &round.cross {
            let peer = all
                .iter()
                .find(|mirror| mirror.shard() == tx.inputs[1].shard)
                .unwrap();
            let foreign = peer.utxo(&tx.inputs[1].outpoint).unwrap();
            assert!(in_subset(&foreign.owner, 2, 3));
        }
    }

    #[test]
    fn test_round_spends_reject_reused_inputs() {
        let all = mirrors(2, 40);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let workload = UtxoWorkload::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        // Shard 1 spends its own outputs while shard 0 reaches for them too.
        let local = workload
            .generate(0, 1, &all[1], &[], &settings, &mut rng)
            .unwrap();
        let remote = workload
            .generate(0, 1, &all[0], &all[1..], &settings, &mut rng)
            .unwrap();

        let mut spends = RoundSpends::new();
        let mut admitted = Vec::new();
        for tx in remote.cross.iter().chain(&local.intra) {
            if spends.is_free(tx) {
                spends.claim(tx);
                admitted.push(tx);
            }
        }
        assert!(admitted.len() < remote.cross.len() + local.intra.len());

        let mut seen = HashSet::new();
        for tx in admitted {
            for input in &tx.inputs {
                assert!(seen.insert(input.outpoint));
            }
        }
        assert_eq!(seen.len(), spends.len());
    }

    #[test]
    fn test_round_respects_cap() {
        let all = mirrors(2, 100);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_max_num_txs_per_batch(15);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let round = UtxoWorkload::new()
            .generate(0, 1, &all[0], &all[1..], &settings, &mut rng)
            .unwrap();
        assert_eq!(round.len(), 15);
    }

    #[test]
    fn test_cross_falls_back_to_intra_without_peer_outputs() {
        let own = ShardMirror::with_testing_addresses(ShardId(0), 10, 50);
        let peer = ShardMirror::new(ShardId(1));
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        let round = UtxoWorkload::new()
            .generate(0, 1, &own, &[Arc::new(peer)], &settings, &mut rng)
            .unwrap();
        assert!(round.cross.is_empty());
        assert_eq!(round.intra.len(), 10);
    }
}
