use crate::error::{BlockchainError, Result};
use crate::utils::{base58_encode, new_key_pair, public_key_from_pkcs8, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use std::fs;
use std::path::Path;

/// The node's network key pair and the id derived from it.
///
/// Stored as two hex lines in the keystore file: the PKCS#8 document, then
/// the public key. The id is base58(SHA-256(public key)) so it stays stable
/// across restarts.
#[derive(Clone)]
pub struct NodeIdentity {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
    id: String,
}

impl NodeIdentity {
    pub fn generate() -> Result<NodeIdentity> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(NodeIdentity::from_parts(pkcs8, public_key))
    }

    /// Load the keystore at `path`, creating it when missing
    pub fn load_or_create(path: &Path) -> Result<NodeIdentity> {
        if path.exists() {
            let identity = Self::load(path)?;
            info!("Loaded node identity {} from {}", identity.id, path.display());
            return Ok(identity);
        }

        let identity = Self::generate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = format!(
            "{}\n{}\n",
            HEXLOWER.encode(&identity.pkcs8),
            HEXLOWER.encode(&identity.public_key)
        );
        fs::write(path, contents)?;
        info!("Created node identity {} at {}", identity.id, path.display());
        Ok(identity)
    }

    pub fn load(path: &Path) -> Result<NodeIdentity> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let (Some(private_line), Some(public_line)) = (lines.next(), lines.next()) else {
            return Err(BlockchainError::Crypto(format!(
                "keystore {} must hold a private and a public key line",
                path.display()
            )));
        };

        let pkcs8 = decode_hex(private_line, "private key")?;
        let public_key = decode_hex(public_line, "public key")?;
        if public_key_from_pkcs8(&pkcs8)? != public_key {
            return Err(BlockchainError::Crypto(format!(
                "keystore {}: public key does not match private key",
                path.display()
            )));
        }
        Ok(NodeIdentity::from_parts(pkcs8, public_key))
    }

    fn from_parts(pkcs8: Vec<u8>, public_key: Vec<u8>) -> NodeIdentity {
        let id = base58_encode(&sha256_digest(&public_key));
        NodeIdentity {
            pkcs8,
            public_key,
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

fn decode_hex(line: &str, what: &str) -> Result<Vec<u8>> {
    HEXLOWER
        .decode(line.as_bytes())
        .map_err(|e| BlockchainError::Crypto(format!("bad {what} in keystore: {e}")))
}
