use std::path::PathBuf;

use serde::Deserialize;

/// Asset storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory under which every resource type owns a sub-directory.
    /// Default: "./storage/resources".
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Largest asset accepted by the store, in bytes. Default: 32 MiB.
    #[serde(default = "default_max_asset_size")]
    pub max_asset_size: u64,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage/resources")
}
fn default_max_asset_size() -> u64 {
    32 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_asset_size: default_max_asset_size(),
        }
    }
}
