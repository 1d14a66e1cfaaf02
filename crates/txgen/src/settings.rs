//! Generation settings.

use txgen_types::LeaderMap;

/// Default size of each shard's synthetic address pool.
pub const DEFAULT_NUM_OF_ADDRESS: usize = 10_000;

/// Default per-round, per-shard transaction cap.
pub const DEFAULT_MAX_NUM_TXS_PER_BATCH: usize = 20_000;

/// Default percentage of cross-shard transactions.
pub const DEFAULT_CROSS_SHARD_RATIO: u8 = 30;

/// Knobs that shape every generated batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Number of funded synthetic addresses per shard.
    pub num_of_address: usize,

    /// Whether cross-shard transactions may be generated at all.
    pub cross_shard: bool,

    /// Upper bound on transactions sent to one shard in one round.
    pub max_num_txs_per_batch: usize,

    /// Percentage (0–100) of generated transactions that go cross-shard.
    pub cross_shard_ratio: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_of_address: DEFAULT_NUM_OF_ADDRESS,
            cross_shard: false,
            max_num_txs_per_batch: DEFAULT_MAX_NUM_TXS_PER_BATCH,
            cross_shard_ratio: DEFAULT_CROSS_SHARD_RATIO,
        }
    }
}

impl Settings {
    /// Default settings for a topology; cross-shard generation is enabled
    /// only when more than one shard exists.
    pub fn for_leaders(leaders: &LeaderMap) -> Self {
        Self {
            cross_shard: leaders.len() > 1,
            ..Default::default()
        }
    }

    /// Set the address pool size.
    pub fn with_num_of_address(mut self, num: usize) -> Self {
        self.num_of_address = num;
        self
    }

    /// Enable or disable cross-shard generation.
    pub fn with_cross_shard(mut self, enabled: bool) -> Self {
        self.cross_shard = enabled;
        self
    }

    /// Set the per-round batch cap.
    pub fn with_max_num_txs_per_batch(mut self, max: usize) -> Self {
        self.max_num_txs_per_batch = max;
        self
    }

    /// Set the cross-shard percentage, clamped to 100.
    pub fn with_cross_shard_ratio(mut self, ratio: u8) -> Self {
        self.cross_shard_ratio = ratio.min(100);
        self
    }

    /// Roll whether the next transaction should be cross-shard.
    pub(crate) fn roll_cross_shard<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.cross_shard && rng.gen_range(0..100u8) < self.cross_shard_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_ratio_is_clamped() {
        let settings = Settings::default().with_cross_shard_ratio(250);
        assert_eq!(settings.cross_shard_ratio, 100);
    }

    #[test]
    fn test_roll_respects_flag_and_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let disabled = Settings::default().with_cross_shard_ratio(100);
        assert!((0..100).all(|_| !disabled.roll_cross_shard(&mut rng)));

        let always = disabled.with_cross_shard(true);
        assert!((0..100).all(|_| always.roll_cross_shard(&mut rng)));

        let never = always.with_cross_shard_ratio(0);
        assert!((0..100).all(|_| !never.roll_cross_shard(&mut rng)));
    }
}
