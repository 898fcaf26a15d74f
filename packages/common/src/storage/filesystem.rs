use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::error::StorageError;
use super::hash::ContentHash;
use super::path::normalize_type_path;
use super::traits::AssetStore;

/// Filesystem-backed content-addressed asset store.
///
/// Assets are stored flat per resource type:
/// `{root}/{type path}/{64 hex chars}.jpg`
pub struct FilesystemAssetStore {
    root: PathBuf,
    max_size: u64,
}

impl FilesystemAssetStore {
    /// Create a new filesystem asset store.
    pub async fn new(root: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self { root, max_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by a resource type.
    pub fn type_dir(&self, type_path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(normalize_type_path(type_path)?))
    }

    /// Compute the filesystem path of an asset. Only content-addressed names
    /// are accepted.
    pub fn asset_path(&self, type_path: &str, asset_name: &str) -> Result<PathBuf, StorageError> {
        ContentHash::from_asset_name(asset_name)?;
        Ok(self.type_dir(type_path)?.join(asset_name))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.root
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl AssetStore for FilesystemAssetStore {
    async fn put(&self, type_path: &str, data: &[u8]) -> Result<ContentHash, StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let hash = ContentHash::compute(data);
        let dir = self.type_dir(type_path)?;
        let asset_path = dir.join(hash.asset_name());

        // Another writer with the same bytes may race us here; `create_dir_all`
        // treats an existing directory as success.
        fs::create_dir_all(&dir).await?;

        if fs::try_exists(&asset_path).await? {
            debug!(path = %asset_path.display(), "asset already stored");
            return Ok(hash);
        }

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &asset_path).await {
            let _ = fs::remove_file(&temp_path).await;
            // Same name means same bytes, so a concurrent winner is fine.
            if fs::try_exists(&asset_path).await.unwrap_or(false) {
                return Ok(hash);
            }
            return Err(e.into());
        }

        Ok(hash)
    }

    async fn get(&self, type_path: &str, asset_name: &str) -> Result<Vec<u8>, StorageError> {
        let asset_path = self.asset_path(type_path, asset_name)?;
        match fs::read(&asset_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(asset_path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, type_path: &str, asset_name: &str) -> Result<bool, StorageError> {
        let asset_path = self.asset_path(type_path, asset_name)?;
        Ok(fs::try_exists(&asset_path).await?)
    }
}
