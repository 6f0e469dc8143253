//! Compatibility helpers for the legacy network's address format.

pub mod address;

pub use address::{address_from_public_key, is_valid_address, AddressKind, BASE58_ALPHABET};
