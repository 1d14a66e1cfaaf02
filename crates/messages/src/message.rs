//! Message envelope.

use serde::{Deserialize, Serialize};
use txgen_types::{Block, TxBatch};

/// Messages on the leader link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Batch of client transactions for a leader to ingest.
    TransactionList(TxBatch),

    /// Instructs a leader to stop at the end of an experiment.
    Stop,

    /// Newly committed blocks announced by a leader.
    Blocks(Vec<Block>),
}

impl Message {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::TransactionList(TxBatch::Account(_)) => "AccountTransactionList",
            Message::TransactionList(TxBatch::Utxo(_)) => "UtxoTransactionList",
            Message::Stop => "Stop",
            Message::Blocks(_) => "Blocks",
        }
    }

    /// Check if this is a stop message.
    pub fn is_stop(&self) -> bool {
        matches!(self, Message::Stop)
    }
}
