use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix time in seconds
pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_secs();

    i64::try_from(duration).map_err(|_| BlockchainError::Crypto("Timestamp overflow".to_string()))
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

/// Public key bytes of a PKCS#8 encoded ECDSA P-256 key pair
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| {
            BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
        })?;
    Ok(key_pair.public_key().as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::HEXLOWER;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            HEXLOWER.encode(&sha256_digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generated_key_pair_has_public_key() {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();
        // uncompressed P-256 point
        assert_eq!(public_key.len(), 65);
    }

    #[test]
    fn test_base58_roundtrip() {
        let encoded = base58_encode(&[0, 0, 1, 2, 3]);
        assert!(encoded.starts_with("11"));
        assert_eq!(base58_decode(&encoded).unwrap(), vec![0, 0, 1, 2, 3]);
    }
}
