//! Peer-to-peer networking
//!
//! The gossip overlay (TCP transport, topic seam and the channel that
//! persists what arrives), the shared peer registry, the peer directory
//! service and host resolution.

pub mod directory;
pub mod gossip;
pub mod listener;
pub mod message;
pub mod peer;
pub mod resolve;
pub mod topic;
pub mod transport;

pub use directory::{
    query_directory, DirectoryQuery, DirectoryRequest, DirectoryResponse, DirectoryServer,
    Encoding, PeerDirectory,
};
pub use gossip::{Delivery, GossipChannel, BLOCKS_TOPIC};
pub use message::{GossipEnvelope, NewBlock, NewTransactions};
pub use peer::{Direction, PeerInfo, PeerRegistry};
pub use resolve::{resolve_to_socket_addr, DEFAULT_RESOLVE_TIMEOUT};
pub use topic::{MemoryHub, MemoryTopic, Topic, TopicMessage};
pub use transport::{GossipTransport, TransportTopic};
