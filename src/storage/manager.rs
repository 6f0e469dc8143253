// StorageManager owns the engine and hands out one typed store per record kind.
// Key builders live here so every caller encodes heights the same way on disk.

use crate::core::{Block, Status, Transaction};
use crate::error::Result;
use crate::network::PeerInfo;
use crate::storage::engine::Engine;
use crate::storage::record_store::RecordStore;
use log::error;
use std::path::Path;
use std::sync::Arc;

pub const STATUS_PREFIX: &str = "status:";
pub const BLOCK_PREFIX: &str = "block:";
pub const TRANSACTION_PREFIX: &str = "tx:";
pub const PENDING_PREFIX: &str = "pending:";
pub const PEER_PREFIX: &str = "peer:";

/// The single key the ledger cursor lives under
pub const STATUS_KEY: &str = "status-main";

/// Zero padded to 16 digits so lexicographic order matches numeric order
pub fn block_key(height: u64) -> String {
    format!("{height:016}")
}

pub fn transaction_key(block_height: u64, hash: &str) -> String {
    format!("{block_height:016}:{hash}")
}

pub fn peer_key(address: &str, id: &str) -> String {
    format!("{address}:{id}")
}

pub struct StorageManager {
    engine: Arc<Engine>,
    status: RecordStore<Status>,
    blocks: RecordStore<Block>,
    transactions: RecordStore<Transaction>,
    pending: RecordStore<Transaction>,
    peers: RecordStore<PeerInfo>,
}

impl StorageManager {
    pub fn open(path: impl AsRef<Path>) -> Result<StorageManager> {
        let engine = Arc::new(Engine::open(path)?);
        Ok(StorageManager {
            status: RecordStore::new(engine.clone(), STATUS_PREFIX),
            blocks: RecordStore::new(engine.clone(), BLOCK_PREFIX),
            transactions: RecordStore::new(engine.clone(), TRANSACTION_PREFIX),
            pending: RecordStore::new(engine.clone(), PENDING_PREFIX),
            peers: RecordStore::new(engine.clone(), PEER_PREFIX),
            engine,
        })
    }

    pub fn status(&self) -> &RecordStore<Status> {
        &self.status
    }

    pub fn blocks(&self) -> &RecordStore<Block> {
        &self.blocks
    }

    /// Transactions confirmed inside a stored block
    pub fn transactions(&self) -> &RecordStore<Transaction> {
        &self.transactions
    }

    pub fn pending_transactions(&self) -> &RecordStore<Transaction> {
        &self.pending
    }

    pub fn peers(&self) -> &RecordStore<PeerInfo> {
        &self.peers
    }

    pub fn path(&self) -> &Path {
        self.engine.path()
    }

    pub fn is_open(&self) -> bool {
        self.engine.is_open()
    }

    /// Flush and release the engine. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        self.engine.close().map(|_| ())
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        if let Err(e) = self.engine.close() {
            error!("Failed to close database on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockchainError;
    use tempfile::TempDir;

    #[test]
    fn test_key_builders() {
        assert_eq!(block_key(0), "0000000000000000");
        assert_eq!(block_key(42), "0000000000000042");
        assert_eq!(transaction_key(7, "TABC"), "0000000000000007:TABC");
        assert_eq!(peer_key("10.0.0.1", "peer1"), "10.0.0.1:peer1");
    }

    #[test]
    fn test_block_keys_list_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        for height in [11u64, 2, 0, 100, 1] {
            let mut block = Block::genesis();
            block.height = height;
            storage.blocks().put(&block_key(height), &block).unwrap();
        }
        let keys = storage.blocks().list_keys().unwrap();
        let expected: Vec<String> = [0u64, 1, 2, 11, 100].iter().map(|h| block_key(*h)).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_confirmed_and_pending_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        let tx = Transaction::default();
        storage
            .pending_transactions()
            .put(&transaction_key(0, "T1"), &tx)
            .unwrap();
        assert_eq!(storage.pending_transactions().count().unwrap(), 1);
        assert_eq!(storage.transactions().count().unwrap(), 0);
    }

    #[test]
    fn test_close_twice_and_use_after_close() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        storage.close().unwrap();
        storage.close().unwrap();
        assert!(!storage.is_open());
        assert!(matches!(
            storage.status().get(STATUS_KEY),
            Err(BlockchainError::StoreClosed)
        ));
    }

    #[test]
    fn test_reopen_after_close_sees_data() {
        let dir = TempDir::new().unwrap();
        {
            let storage = StorageManager::open(dir.path()).unwrap();
            storage
                .status()
                .put(STATUS_KEY, &Status::new(3, "BTIP".to_string()))
                .unwrap();
            storage.close().unwrap();
        }
        let storage = StorageManager::open(dir.path()).unwrap();
        let status = storage.status().get(STATUS_KEY).unwrap();
        assert_eq!(status.last_block, 3);
        assert_eq!(status.last_hash, "BTIP");
    }
}
