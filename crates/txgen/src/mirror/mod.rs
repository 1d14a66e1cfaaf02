//! Local mirrors of shard state.
//!
//! A mirror is a rough, client-side approximation of one shard's ledger: the
//! synthetic address pool with account balances and nonces, plus the unspent
//! outputs those addresses hold. It exists only so the generator can build
//! plausible transactions; it is never authoritative.
//!
//! Maps are persistent (`im::OrdMap`), so cloning a mirror is O(1). Blocks
//! are applied to a clone that replaces the original only once the whole
//! block has applied cleanly.

mod service;

pub use service::{MirrorHandle, MirrorSet};

use im::OrdMap;
use thiserror::Error;
use txgen_types::{
    AccountBlock, AccountTransaction, Address, Block, BlockHeight, Hash, OutPoint, ShardId,
    UtxoTransaction,
};

/// Balance every synthetic address starts with.
pub const DEFAULT_GENESIS_BALANCE: u64 = 1_000_000;

/// Account-model view of one address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountState {
    pub balance: u64,
    /// Next nonce the account is expected to use.
    pub nonce: u64,
}

/// An unspent output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub owner: Address,
    pub value: u64,
}

/// Errors while applying a block to a mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Balance overflow crediting {address}")]
    BalanceOverflow { address: Address },

    #[error("Output values overflow in transaction {tx}")]
    ValueOverflow { tx: Hash },

    #[error("Mirror service for {0} has stopped")]
    ServiceStopped(ShardId),
}

/// Mirror of a single shard.
#[derive(Clone, Debug)]
pub struct ShardMirror {
    shard: ShardId,
    height: BlockHeight,
    last_block: Hash,
    pool_size: usize,
    accounts: OrdMap<Address, AccountState>,
    utxos: OrdMap<OutPoint, Utxo>,
    blocks_applied: u64,
}

impl ShardMirror {
    /// Create an empty mirror.
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            height: BlockHeight::GENESIS,
            last_block: Hash::ZERO,
            pool_size: 0,
            accounts: OrdMap::new(),
            utxos: OrdMap::new(),
            blocks_applied: 0,
        }
    }

    /// Create a mirror whose pool holds `count` funded synthetic addresses.
    pub fn with_testing_addresses(shard: ShardId, count: usize, balance: u64) -> Self {
        let mut mirror = Self::new(shard);
        mirror.add_testing_addresses(count, balance);
        mirror
    }

    /// Grow the address pool by `count` funded addresses.
    ///
    /// Each new address receives `balance` both as an account balance and as
    /// a single genesis output, so either transaction model can use it.
    pub fn add_testing_addresses(&mut self, count: usize, balance: u64) {
        let start = self.pool_size;
        for index in start..start + count {
            let address = Address::synthetic(self.shard, index as u32);
            self.accounts.insert(
                address,
                AccountState {
                    balance,
                    nonce: 0,
                },
            );
            let genesis = Hash::from_parts(&[
                b"txgen/genesis",
                &self.shard.0.to_le_bytes(),
                &(index as u64).to_le_bytes(),
            ]);
            self.utxos.insert(
                OutPoint::new(genesis, 0),
                Utxo {
                    owner: address,
                    value: balance,
                },
            );
        }
        self.pool_size += count;
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Height of the highest block applied.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Hash of the most recently applied block.
    pub fn last_block(&self) -> Hash {
        self.last_block
    }

    /// Number of synthetic addresses in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Synthetic address at `index` of this shard's pool.
    pub fn pool_address(&self, index: usize) -> Address {
        Address::synthetic(self.shard, index as u32)
    }

    pub fn accounts(&self) -> &OrdMap<Address, AccountState> {
        &self.accounts
    }

    pub fn utxos(&self) -> &OrdMap<OutPoint, Utxo> {
        &self.utxos
    }

    pub fn account(&self, address: &Address) -> Option<AccountState> {
        self.accounts.get(address).copied()
    }

    pub fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.get(outpoint).copied()
    }

    pub fn blocks_applied(&self) -> u64 {
        self.blocks_applied
    }

    /// Apply a block, returning the number of transactions applied.
    ///
    /// All-or-nothing: on error the mirror is left exactly as it was.
    pub fn apply_block(
        &mut self,
        block: &Block,
        account_block: Option<&AccountBlock>,
    ) -> Result<usize, MirrorError> {
        let mut next = self.clone();
        let mut applied = 0;

        if let Some(account_block) = account_block {
            for tx in &account_block.transactions {
                next.apply_account_tx(tx)?;
                applied += 1;
            }
        }
        for tx in &block.transactions {
            next.apply_utxo_tx(tx)?;
            applied += 1;
        }

        next.height = next.height.max(block.height);
        next.last_block = block.hash;
        next.blocks_applied += 1;
        *self = next;
        Ok(applied)
    }

    fn apply_account_tx(&mut self, tx: &AccountTransaction) -> Result<(), MirrorError> {
        if tx.from_shard == self.shard {
            if let Some(mut sender) = self.account(&tx.from) {
                // The mirror may lag the leader; never go below zero.
                sender.balance = sender.balance.saturating_sub(tx.amount);
                sender.nonce = sender.nonce.max(tx.nonce.saturating_add(1));
                self.accounts.insert(tx.from, sender);
            }
        }
        if tx.to_shard == self.shard {
            let mut receiver = self.account(&tx.to).unwrap_or_default();
            receiver.balance = receiver
                .balance
                .checked_add(tx.amount)
                .ok_or(MirrorError::BalanceOverflow { address: tx.to })?;
            self.accounts.insert(tx.to, receiver);
        }
        Ok(())
    }

    fn apply_utxo_tx(&mut self, tx: &UtxoTransaction) -> Result<(), MirrorError> {
        tx.total_output()
            .ok_or(MirrorError::ValueOverflow { tx: tx.id })?;

        for input in tx.inputs.iter().filter(|input| input.shard == self.shard) {
            self.utxos.remove(&input.outpoint);
        }
        for (outpoint, output) in tx.created_outpoints() {
            if output.shard == self.shard {
                self.utxos.insert(
                    outpoint,
                    Utxo {
                        owner: output.owner,
                        value: output.value,
                    },
                );
            }
        }
        Ok(())
    }
}
