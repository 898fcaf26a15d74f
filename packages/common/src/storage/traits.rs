use async_trait::async_trait;

use super::error::StorageError;
use super::hash::ContentHash;

/// Content-addressed asset storage, partitioned into one flat directory per
/// resource type.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store bytes under `type_path` and return their content hash.
    ///
    /// The asset name is `hash.asset_name()`. Storing identical bytes again
    /// is a no-op that returns the same hash.
    async fn put(&self, type_path: &str, data: &[u8]) -> Result<ContentHash, StorageError>;

    /// Retrieve all bytes of a stored asset.
    async fn get(&self, type_path: &str, asset_name: &str) -> Result<Vec<u8>, StorageError>;

    /// Check whether an asset exists.
    async fn exists(&self, type_path: &str, asset_name: &str) -> Result<bool, StorageError>;
}
