use crate::core::hashing::{tagged_hash, TRANSACTION_TAG};
use serde::{Deserialize, Serialize};

/// Amounts carry 8 implied decimals
pub const UNITS_PER_COIN: u64 = 100_000_000;

pub const COINBASE_TYPE: &str = "COINBASE";
pub const SPEND_TYPE: &str = "spend";

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub hash: String,
    /// 0 while pending, otherwise the height of the confirming block
    pub block_height: u64,
    pub tx_type: String,
    pub timestamp: i64,
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub pub_key: String,
    pub verify: String,
}

impl Transaction {
    pub fn is_pending(&self) -> bool {
        self.block_height == 0
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_type == COINBASE_TYPE
    }

    pub fn compute_hash(&self) -> String {
        let input = format!(
            "{}{}{}{}{}{}{}",
            self.block_height,
            self.tx_type,
            self.timestamp,
            self.pub_key,
            self.verify,
            self.sender,
            self.receiver
        );
        tagged_hash(TRANSACTION_TAG, &input)
    }

    pub fn set_hash(&mut self) {
        self.hash = self.compute_hash();
    }
}
