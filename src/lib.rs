//! # Noso Node - Peer-to-Peer Ledger Node
//!
//! This is my node for the Noso network, written in Rust.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Ledger**: Hash-linked blocks and transactions kept in one sled database
//! - **Integrity Check**: Every startup validates the cursor or rescans the chain
//! - **Gossip**: Blocks and transactions propagate on a topic over TCP
//! - **Four Modes**: dns, seed, supernode and plain node, fixed per process
//! - **Peer Directory**: Seeds and DNS nodes answer who is on the network
//! - **Legacy Addresses**: The old N/M account address format still works
//!
//! ## How I Organized My Code
//! - `core/`: Blocks, transactions, the ledger cursor and the integrity check
//! - `storage/`: The sled engine and typed record stores split by key prefix
//! - `network/`: Gossip transport, topic channel, peer registry and directory
//! - `node/`: The node itself, its identity and the synthetic block producer
//! - `runtime/`: Shutdown signal and the join barrier for worker threads
//! - `config/`: TOML configuration with environment and flag overrides
//! - `legacy/`: The legacy account address codec
//! - `utils/`: Digests, base58 and bincode helpers
//! - `cli/`: Command-line interface for the `nosod` binary
//!
//! ## Key Design Decisions I Made
//! - One database, many typed stores; no transactions across stores
//! - A broken chain stops the node; nothing is repaired silently
//! - Configuration is passed explicitly, never read from a global
//! - Threads plus one shutdown signal instead of an async runtime
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `node/node.rs` for startup, modes and shutdown
//! 3. Check `core/integrity.rs` for how the ledger is validated
//! 4. Review `network/transport.rs` for the gossip wire protocol

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod legacy;
pub mod network;
pub mod node;
pub mod runtime;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt, PeerQueryArg};
pub use config::{Config, NodeMode};
pub use core::{
    verify_chain, Block, BlockAcceptance, ChainIntegrity, IntegrityOutcome, Ledger, LedgerReport,
    Status, Transaction, GENESIS_HASH,
};
pub use error::{BlockchainError, IntegrityError, Result};
pub use legacy::{address_from_public_key, is_valid_address, AddressKind};
pub use network::{
    query_directory, DirectoryQuery, DirectoryRequest, DirectoryResponse, Encoding,
    GossipChannel, GossipEnvelope, GossipTransport, PeerDirectory, PeerInfo, PeerRegistry,
};
pub use node::{Node, NodeIdentity};
pub use runtime::{ShutdownSignal, TaskGroup};
pub use storage::{RecordStore, StorageManager};
pub use utils::{base58_decode, base58_encode, current_timestamp, sha256_digest};
