use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StorageError;

/// Extension carried by every stored asset. The transcoder always emits JPEG.
pub const ASSET_EXTENSION: &str = "jpg";

/// A validated SHA-256 digest of an asset's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hash.into())
    }

    /// Parse a hex-encoded content hash string.
    pub fn from_hex(s: &str) -> Result<Self, StorageError> {
        if s.len() != 64 {
            return Err(StorageError::InvalidAssetName(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes = hex::decode(s)
            .map_err(|e| StorageError::InvalidAssetName(format!("invalid hex: {e}")))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidAssetName("decoded to wrong length".into()))?;

        Ok(Self(arr))
    }

    /// Parse an asset file name of the form `<64 hex>.jpg`.
    pub fn from_asset_name(name: &str) -> Result<Self, StorageError> {
        let stem = name
            .strip_suffix(ASSET_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| {
                StorageError::InvalidAssetName(format!("{name:?} lacks .{ASSET_EXTENSION}"))
            })?;
        Self::from_hex(stem)
    }

    /// Return the hash as a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// File name under which the asset is stored inside its type directory.
    pub fn asset_name(&self) -> String {
        format!("{}.{ASSET_EXTENSION}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
