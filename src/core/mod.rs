//! Core ledger functionality
//!
//! Blocks, transactions, the ledger cursor, hash derivation, the write paths
//! that keep them consistent and the startup integrity check.

pub mod block;
pub mod hashing;
pub mod integrity;
pub mod ledger;
pub mod status;
pub mod transaction;

pub use block::{Block, GENESIS_HASH};
pub use integrity::{verify_chain, ChainIntegrity, IntegrityOutcome, LedgerReport};
pub use ledger::{BlockAcceptance, Ledger};
pub use status::Status;
pub use transaction::{Transaction, COINBASE_TYPE, SPEND_TYPE, UNITS_PER_COIN};
