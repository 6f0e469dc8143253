//! Utility functions and helpers
//!
//! Digests, base58, key generation and the bincode helpers shared by the
//! store and the gossip codec.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, new_key_pair, public_key_from_pkcs8,
    ripemd160_digest, sha256_digest,
};

pub use serialization::{deserialize, deserialize_exact, serialize};
