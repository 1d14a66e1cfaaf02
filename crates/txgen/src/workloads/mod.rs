//! Transaction generators.
//!
//! Two interchangeable strategies, picked once at startup:
//!
//! - [`AccountWorkload`]: transfers between account balances.
//! - [`UtxoWorkload`]: spends of unspent outputs, processing one subset of
//!   the address space per round and returning cross-shard transactions
//!   separately.
//!
//! Generators read a shard's mirror and read-only snapshots of the other
//! shards' mirrors. They never mutate mirror state; all randomness comes
//! from the caller's RNG, so output is deterministic for a given seed.

mod account;
mod utxo;

pub use account::{AccountWorkload, MAX_TRANSFER_AMOUNT};
pub use utxo::{in_subset, RoundSpends, UtxoRound, UtxoWorkload};

use crate::mirror::ShardMirror;
use rand::Rng;
use thiserror::Error;
use txgen_types::{Address, ShardId};

/// Errors during generation. The caller degrades these to an empty batch.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("Address pool of {0} is empty")]
    EmptyAddressPool(ShardId),
}

/// Pick a random address from a mirror's synthetic pool.
fn random_pool_address<R: Rng + ?Sized>(
    mirror: &ShardMirror,
    rng: &mut R,
) -> Result<Address, WorkloadError> {
    if mirror.pool_size() == 0 {
        return Err(WorkloadError::EmptyAddressPool(mirror.shard()));
    }
    Ok(mirror.pool_address(rng.gen_range(0..mirror.pool_size())))
}

/// Pick a random pool address different from `exclude` when the pool allows.
fn random_pool_address_except<R: Rng + ?Sized>(
    mirror: &ShardMirror,
    exclude: Address,
    rng: &mut R,
) -> Result<Address, WorkloadError> {
    let pool = mirror.pool_size();
    if pool == 0 {
        return Err(WorkloadError::EmptyAddressPool(mirror.shard()));
    }
    let index = rng.gen_range(0..pool);
    let candidate = mirror.pool_address(index);
    if candidate == exclude && pool > 1 {
        return Ok(mirror.pool_address((index + 1) % pool));
    }
    Ok(candidate)
}
