use crate::core::hashing::{tagged_hash, BLOCK_TAG};
use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Fixed hash of the block at height 0
pub const GENESIS_HASH: &str = "BZERO";

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub previous_hash: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Placeholder until blocks carry a real merkle tree
    pub merkle_root: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block on top of `previous_hash` and derive its hash
    pub fn new(
        height: u64,
        previous_hash: String,
        timestamp: i64,
        transactions: Vec<Transaction>,
    ) -> Block {
        let mut block = Block {
            height,
            hash: String::new(),
            previous_hash,
            timestamp,
            merkle_root: String::new(),
            transactions,
        };
        block.set_hash();
        block
    }

    pub fn genesis() -> Block {
        Block {
            height: 0,
            hash: GENESIS_HASH.to_string(),
            previous_hash: String::new(),
            timestamp: 0,
            merkle_root: String::new(),
            transactions: vec![],
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn compute_hash(&self) -> String {
        if self.height == 0 {
            return GENESIS_HASH.to_string();
        }
        let merkle = if self.merkle_root.is_empty() {
            format!("MerkleFor:{}", self.height)
        } else {
            self.merkle_root.clone()
        };
        let input = format!(
            "{}{}{}{}",
            self.height, self.previous_hash, self.timestamp, merkle
        );
        tagged_hash(BLOCK_TAG, &input)
    }

    pub fn set_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }
}
