//! Data storage and persistence
//!
//! One sled database per node, split into typed record stores by key prefix:
//! ledger status, blocks, confirmed and pending transactions, and the peer
//! registry snapshot.

pub mod engine;
pub mod manager;
pub mod record_store;

pub use engine::Engine;
pub use manager::{
    block_key, peer_key, transaction_key, StorageManager, BLOCK_PREFIX, PEER_PREFIX,
    PENDING_PREFIX, STATUS_KEY, STATUS_PREFIX, TRANSACTION_PREFIX,
};
pub use record_store::{Batch, Record, RecordStore};
