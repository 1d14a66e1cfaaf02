//! Account-model transfer generator.

use super::{random_pool_address, random_pool_address_except, WorkloadError};
use crate::mirror::ShardMirror;
use crate::settings::Settings;
use rand::Rng;
use std::sync::Arc;
use txgen_types::AccountTransaction;

/// Largest amount moved by one synthetic transfer.
pub const MAX_TRANSFER_AMOUNT: u64 = 100;

/// Generates account-model transfers for one shard.
#[derive(Clone, Debug)]
pub struct AccountWorkload {
    max_amount: u64,
}

impl Default for AccountWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountWorkload {
    /// Create a new account workload generator.
    pub fn new() -> Self {
        Self {
            max_amount: MAX_TRANSFER_AMOUNT,
        }
    }

    /// Generate up to `max_num_txs_per_batch` transfers originating in
    /// `mirror`'s shard.
    ///
    /// Each funded account sends at most once per batch, using the nonce the
    /// mirror currently expects. Receivers of cross-shard transfers come from
    /// `peers`, which must not include the mirror's own shard; with no peers
    /// every transfer stays on-shard.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        mirror: &ShardMirror,
        peers: &[Arc<ShardMirror>],
        settings: &Settings,
        rng: &mut R,
    ) -> Result<Vec<AccountTransaction>, WorkloadError> {
        let senders: Vec<_> = mirror
            .accounts()
            .iter()
            .filter(|(_, state)| state.balance > 0)
            .map(|(address, state)| (*address, *state))
            .collect();

        let count = senders.len().min(settings.max_num_txs_per_batch);
        if count == 0 {
            return Ok(Vec::new());
        }

        let shard = mirror.shard();
        let mut txs = Vec::with_capacity(count);
        for index in rand::seq::index::sample(rng, senders.len(), count).into_iter() {
            let (from, state) = senders[index];
            let amount = rng.gen_range(1..=state.balance.min(self.max_amount));

            let (to, to_shard) = if !peers.is_empty() && settings.roll_cross_shard(rng) {
                let peer = &peers[rng.gen_range(0..peers.len())];
                (random_pool_address(peer, rng)?, peer.shard())
            } else {
                (random_pool_address_except(mirror, from, rng)?, shard)
            };

            txs.push(AccountTransaction::new(
                from,
                shard,
                to,
                to_shard,
                amount,
                state.nonce,
            ));
        }

        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::DEFAULT_GENESIS_BALANCE;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
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
    fn test_batch_respects_cap() {
        let all = mirrors(2, 50);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_max_num_txs_per_batch(20);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let txs = AccountWorkload::new()
            .generate(&all[0], &all[1..], &settings, &mut rng)
            .unwrap();
        assert_eq!(txs.len(), 20);
        assert!(txs.iter().all(|tx| tx.from_shard == ShardId(0)));
    }

    #[test]
    fn test_all_cross_shard_at_full_ratio() {
        let all = mirrors(2, 30);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let txs = AccountWorkload::new()
            .generate(&all[0], &all[1..], &settings, &mut rng)
            .unwrap();
        assert_eq!(txs.len(), 30);
        for tx in &txs {
            assert!(tx.is_cross_shard());
            assert_eq!(tx.to_shard, ShardId(1));
            assert!(all[1].account(&tx.to).is_some());
        }
    }

    #[test]
    fn test_single_shard_never_cross() {
        let all = mirrors(1, 30);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let txs = AccountWorkload::new()
            .generate(&all[0], &[], &settings, &mut rng)
            .unwrap();
        assert!(!txs.is_empty());
        assert!(txs.iter().all(|tx| !tx.is_cross_shard()));
    }

    #[test]
    fn test_zero_ratio_never_cross_over_many_rounds() {
        let all = mirrors(3, 10);
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(0)
            .with_max_num_txs_per_batch(10);
        let workload = AccountWorkload::new();
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        for round in 0..1000 {
            let shard = round % all.len();
            let peers: Vec<_> = all
                .iter()
                .filter(|m| m.shard() != all[shard].shard())
                .cloned()
                .collect();
            let txs = workload
                .generate(&all[shard], &peers, &settings, &mut rng)
                .unwrap();
            assert!(txs.iter().all(|tx| !tx.is_cross_shard()));
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let all = mirrors(2, 25);
        let settings = Settings::default().with_cross_shard(true);
        let workload = AccountWorkload::new();

        let a = workload
            .generate(&all[0], &all[1..], &settings, &mut ChaCha8Rng::seed_from_u64(5))
            .unwrap();
        let b = workload
            .generate(&all[0], &all[1..], &settings, &mut ChaCha8Rng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_peer_pool_is_an_error() {
        let own = ShardMirror::with_testing_addresses(ShardId(0), 5, 100);
        let empty_peer = Arc::new(ShardMirror::new(ShardId(1)));
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let result = AccountWorkload::new().generate(&own, &[empty_peer], &settings, &mut rng);
        assert!(matches!(result, Err(WorkloadError::EmptyAddressPool(ShardId(1)))));
    }

    #[test]
    fn test_unfunded_mirror_yields_empty_batch() {
        let own = ShardMirror::new(ShardId(0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let txs = AccountWorkload::new()
            .generate(&own, &[], &Settings::default(), &mut rng)
            .unwrap();
        assert!(txs.is_empty());
    }
}
