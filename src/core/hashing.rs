// Record hash derivation.
// A hash is a one-letter tag followed by the uppercase hex of the salt and
// the SHA-256 of the record's fields concatenated as decimal text.

use crate::utils::sha256_digest;
use data_encoding::HEXUPPER;

pub const HASH_SALT: &[u8] = b"Noso";

pub const BLOCK_TAG: &str = "B";
pub const TRANSACTION_TAG: &str = "T";

pub fn tagged_hash(tag: &str, input: &str) -> String {
    let mut bytes = HASH_SALT.to_vec();
    bytes.extend(sha256_digest(input.as_bytes()));
    format!("{tag}{}", HEXUPPER.encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_layout() {
        let hash = tagged_hash(BLOCK_TAG, "anything");
        assert!(hash.starts_with("B4E6F736F"));
        // tag + 4 salt bytes + 32 digest bytes, hex encoded
        assert_eq!(hash.len(), 1 + 2 * (4 + 32));
        assert_eq!(hash, tagged_hash(BLOCK_TAG, "anything"));
        assert_ne!(hash, tagged_hash(BLOCK_TAG, "something else"));
    }
}
