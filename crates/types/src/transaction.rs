//! Transaction types for the account and UTXO models.

use crate::{Address, Hash, OutPoint, ShardId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Common view over both transaction models.
///
/// The generator only cares about three things: a stable identifier, which
/// shards supply inputs, and whether that makes the transaction cross-shard.
pub trait Transaction {
    /// Transaction identifier.
    fn id(&self) -> Hash;

    /// Shards that supply inputs to this transaction.
    fn input_shards(&self) -> BTreeSet<ShardId>;

    /// A transaction is cross-shard when its inputs span more than one shard.
    fn is_cross_shard(&self) -> bool {
        self.input_shards().len() > 1
    }
}

/// Account-model transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransaction {
    /// Hash of the transfer body.
    pub id: Hash,
    pub from: Address,
    pub from_shard: ShardId,
    pub to: Address,
    pub to_shard: ShardId,
    pub amount: u64,
    pub nonce: u64,
}

impl AccountTransaction {
    /// Build a transfer and derive its ID from the body.
    pub fn new(
        from: Address,
        from_shard: ShardId,
        to: Address,
        to_shard: ShardId,
        amount: u64,
        nonce: u64,
    ) -> Self {
        let body = bincode::serialize(&(from, from_shard, to, to_shard, amount, nonce))
            .expect("account transaction serialization should never fail");
        Self {
            id: Hash::from_parts(&[b"txgen/account-tx", &body]),
            from,
            from_shard,
            to,
            to_shard,
            amount,
            nonce,
        }
    }
}

impl Transaction for AccountTransaction {
    fn id(&self) -> Hash {
        self.id
    }

    fn input_shards(&self) -> BTreeSet<ShardId> {
        [self.from_shard, self.to_shard].into_iter().collect()
    }
}

/// A UTXO-model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxInput {
    /// Output being spent.
    pub outpoint: OutPoint,
    /// Shard holding that output.
    pub shard: ShardId,
}

/// A UTXO-model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutput {
    pub owner: Address,
    /// Shard the new output lands on.
    pub shard: ShardId,
    pub value: u64,
}

/// UTXO-model transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoTransaction {
    /// Hash of the inputs and outputs.
    pub id: Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl UtxoTransaction {
    /// Build a transaction and derive its ID from inputs and outputs.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let body = bincode::serialize(&(&inputs, &outputs))
            .expect("utxo transaction serialization should never fail");
        Self {
            id: Hash::from_parts(&[b"txgen/utxo-tx", &body]),
            inputs,
            outputs,
        }
    }

    /// Outpoints created by this transaction, paired with their outputs.
    pub fn created_outpoints(&self) -> impl Iterator<Item = (OutPoint, &TxOutput)> + '_ {
        self.outputs
            .iter()
            .enumerate()
            .map(move |(index, output)| (OutPoint::new(self.id, index as u32), output))
    }

    /// Sum of all output values, `None` on overflow.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }
}

impl Transaction for UtxoTransaction {
    fn id(&self) -> Hash {
        self.id
    }

    fn input_shards(&self) -> BTreeSet<ShardId> {
        self.inputs.iter().map(|input| input.shard).collect()
    }
}

/// An ordered batch of transactions bound for one leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxBatch {
    Account(Vec<AccountTransaction>),
    Utxo(Vec<UtxoTransaction>),
}

impl TxBatch {
    /// Number of transactions in the batch.
    pub fn len(&self) -> usize {
        match self {
            TxBatch::Account(txs) => txs.len(),
            TxBatch::Utxo(txs) => txs.len(),
        }
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// IDs of all transactions in the batch, in order.
    pub fn ids(&self) -> Vec<Hash> {
        match self {
            TxBatch::Account(txs) => txs.iter().map(Transaction::id).collect(),
            TxBatch::Utxo(txs) => txs.iter().map(Transaction::id).collect(),
        }
    }
}

impl From<Vec<AccountTransaction>> for TxBatch {
    fn from(txs: Vec<AccountTransaction>) -> Self {
        TxBatch::Account(txs)
    }
}

impl From<Vec<UtxoTransaction>> for TxBatch {
    fn from(txs: Vec<UtxoTransaction>) -> Self {
        TxBatch::Utxo(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(shard: u32, seed: &[u8]) -> TxInput {
        TxInput {
            outpoint: OutPoint::new(Hash::from_bytes(seed), 0),
            shard: ShardId(shard),
        }
    }

    #[test]
    fn test_account_transfer_designation() {
        let from = Address::synthetic(ShardId(0), 0);
        let to = Address::synthetic(ShardId(1), 0);

        let intra = AccountTransaction::new(from, ShardId(0), from, ShardId(0), 5, 0);
        assert!(!intra.is_cross_shard());

        let cross = AccountTransaction::new(from, ShardId(0), to, ShardId(1), 5, 0);
        assert!(cross.is_cross_shard());
        assert_eq!(cross.input_shards().len(), 2);
        assert_ne!(intra.id(), cross.id());
    }

    #[test]
    fn test_utxo_input_shards() {
        let owner = Address::synthetic(ShardId(0), 0);
        let output = TxOutput {
            owner,
            shard: ShardId(0),
            value: 10,
        };

        let intra = UtxoTransaction::new(vec![input(0, b"a"), input(0, b"b")], vec![output]);
        assert!(!intra.is_cross_shard());

        let cross = UtxoTransaction::new(vec![input(0, b"a"), input(2, b"b")], vec![output]);
        assert!(cross.is_cross_shard());
        assert_eq!(
            cross.input_shards().into_iter().collect::<Vec<_>>(),
            vec![ShardId(0), ShardId(2)]
        );
    }

    #[test]
    fn test_created_outpoints_use_tx_id() {
        let owner = Address::synthetic(ShardId(0), 0);
        let out = TxOutput {
            owner,
            shard: ShardId(0),
            value: 1,
        };
        let tx = UtxoTransaction::new(vec![input(0, b"a")], vec![out, out]);
        let created: Vec<_> = tx.created_outpoints().map(|(op, _)| op).collect();
        assert_eq!(created, vec![OutPoint::new(tx.id, 0), OutPoint::new(tx.id, 1)]);
        assert_eq!(tx.total_output(), Some(2));
    }
}
