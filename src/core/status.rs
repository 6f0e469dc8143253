use crate::core::Block;
use serde::{Deserialize, Serialize};

/// The ledger cursor: last validated block height and hash
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Status {
    pub last_block: u64,
    pub last_hash: String,
}

impl Status {
    pub fn new(last_block: u64, last_hash: String) -> Status {
        Status {
            last_block,
            last_hash,
        }
    }

    pub fn at(block: &Block) -> Status {
        Status::new(block.height, block.hash.clone())
    }

    /// True when `block` is the direct successor of this cursor
    pub fn is_extended_by(&self, block: &Block) -> bool {
        block.height == self.last_block + 1 && block.previous_hash == self.last_hash
    }
}
