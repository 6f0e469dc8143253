//! Gossip envelope
//!
//! The two messages propagated on the block topic. The encoding is bincode 2
//! with the standard configuration; the Rust types below are the schema.

use crate::core::{Block, Transaction};
use crate::error::Result;
use crate::utils::{deserialize_exact, serialize};

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct NewBlock {
    pub block: Block,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct NewTransactions {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum GossipEnvelope {
    NewBlock(NewBlock),
    NewTransactions(NewTransactions),
}

impl GossipEnvelope {
    pub fn new_block(block: Block, transactions: Vec<Transaction>) -> GossipEnvelope {
        GossipEnvelope::NewBlock(NewBlock {
            block,
            transactions,
        })
    }

    pub fn new_transactions(transactions: Vec<Transaction>) -> GossipEnvelope {
        GossipEnvelope::NewTransactions(NewTransactions { transactions })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GossipEnvelope::NewBlock(_) => "new-block",
            GossipEnvelope::NewTransactions(_) => "new-transactions",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Decode a complete message; trailing bytes are an error
    pub fn decode(bytes: &[u8]) -> Result<GossipEnvelope> {
        deserialize_exact(bytes)
    }
}
