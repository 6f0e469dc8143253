//! Fixtures for ledger and node tests

use crate::core::{Block, Ledger, Transaction, COINBASE_TYPE, UNITS_PER_COIN};
use crate::storage::{block_key, transaction_key, StorageManager};
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh storage in a temporary directory; keep the `TempDir` alive
pub fn temp_storage() -> (TempDir, Arc<StorageManager>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let storage =
        StorageManager::open(dir.path().join("db")).expect("Failed to open test storage");
    (dir, Arc::new(storage))
}

pub fn temp_ledger() -> (TempDir, Ledger) {
    let (dir, storage) = temp_storage();
    (dir, Ledger::new(storage))
}

/// A coinbase paying the test receiver, confirmed at `height`
pub fn coinbase_tx(height: u64, timestamp: i64) -> Transaction {
    let mut tx = Transaction {
        block_height: height,
        tx_type: COINBASE_TYPE.to_string(),
        timestamp,
        sender: "COINBASE".to_string(),
        receiver: "NReceiver".to_string(),
        amount: UNITS_PER_COIN,
        pub_key: "badbeef".to_string(),
        verify: "badbeef".to_string(),
        ..Transaction::default()
    };
    tx.set_hash();
    tx
}

/// Genesis plus `len - 1` correctly linked blocks, one coinbase each
pub fn linked_chain(len: u64) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    for height in 1..len {
        let timestamp = 1_000_000_000 + height as i64;
        let previous = chain[chain.len() - 1].hash.clone();
        chain.push(Block::new(
            height,
            previous,
            timestamp,
            vec![coinbase_tx(height, timestamp)],
        ));
    }
    chain
}

/// Write blocks and their transactions without touching the cursor
pub fn store_chain(ledger: &Ledger, chain: &[Block]) {
    let storage = ledger.storage();
    for block in chain {
        storage
            .blocks()
            .put(&block_key(block.height), block)
            .expect("Failed to store block");
        for tx in &block.transactions {
            storage
                .transactions()
                .put(&transaction_key(block.height, &tx.hash), tx)
                .expect("Failed to store transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_chain_links() {
        let chain = linked_chain(4);
        assert_eq!(chain.len(), 4);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
            assert_eq!(pair[1].height, pair[0].height + 1);
        }
    }
}
