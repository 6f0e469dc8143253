// Thin wrappers around bincode 2 with the standard configuration.
use crate::error::{BlockchainError, Result};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Decode(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

/// Like [`deserialize`], but every input byte must be consumed
pub fn deserialize_exact<T>(bytes: &[u8]) -> Result<T>
where
    T: bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, read) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Decode(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Decode(format!(
            "{} trailing bytes after message",
            bytes.len() - read
        )));
    }
    Ok(data)
}
