//! Legacy account addresses
//!
//! An address is a one-letter prefix, the base58 RIPEMD-160 of the
//! uppercase hex SHA-256 of the public key string, and a short checksum:
//! the sum of that base58 string's alphabet indices, itself in base58.

use crate::utils::{base58_encode, ripemd160_digest, sha256_digest};
use data_encoding::HEXUPPER;

pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const MIN_ADDRESS_LEN: usize = 21;
const CHECKSUM_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Normal,
    Multisig,
}

impl AddressKind {
    pub fn prefix(&self) -> char {
        match self {
            AddressKind::Normal => 'N',
            AddressKind::Multisig => 'M',
        }
    }

    fn from_prefix(prefix: char) -> Option<AddressKind> {
        match prefix {
            'N' => Some(AddressKind::Normal),
            'M' => Some(AddressKind::Multisig),
            _ => None,
        }
    }
}

pub fn address_from_public_key(public_key: &str, kind: AddressKind) -> String {
    let sha_hex = HEXUPPER.encode(&sha256_digest(public_key.as_bytes()));
    let hash = base58_encode(&ripemd160_digest(sha_hex.as_bytes()));
    let checksum = match summary(&hash) {
        Some(sum) => decimal_to_base58(sum),
        None => String::new(),
    };
    format!("{}{hash}{checksum}", kind.prefix())
}

pub fn is_valid_address(address: &str) -> bool {
    if address.len() < MIN_ADDRESS_LEN || !address.is_ascii() {
        return false;
    }
    let mut chars = address.chars();
    let Some(kind) = chars.next().and_then(AddressKind::from_prefix) else {
        return false;
    };

    let body = &address[1..address.len() - CHECKSUM_LEN];
    let Some(sum) = summary(body) else {
        return false;
    };
    format!("{}{body}{}", kind.prefix(), decimal_to_base58(sum)) == address
}

/// Sum of alphabet indices; `None` if a character is not base58
fn summary(text: &str) -> Option<u64> {
    text.chars().try_fold(0u64, |sum, c| {
        BASE58_ALPHABET.find(c).map(|index| sum + index as u64)
    })
}

/// Plain positional base58 of a number; zero encodes as the empty string
fn decimal_to_base58(mut value: u64) -> String {
    let alphabet = BASE58_ALPHABET.as_bytes();
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(alphabet[(value % 58) as usize]);
        value /= 58;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
