use std::sync::Arc;

use common::storage::{AssetStore, FilesystemAssetStore};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::cache::ResourceCache;
use crate::catalog::{DatabaseCatalog, ResourceCatalog};
use crate::config::AppConfig;
use crate::derivation::DerivationEngine;
use crate::error::StartupError;
use crate::placeholder::PlaceholderResolver;
use crate::registry::TypeRegistry;
use crate::{database, seed};

/// Process-wide services. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<dyn AssetStore>,
    pub catalog: Arc<dyn ResourceCatalog>,
    pub placeholders: Arc<PlaceholderResolver>,
    pub engine: DerivationEngine,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn AssetStore>,
        catalog: Arc<dyn ResourceCatalog>,
    ) -> Self {
        let engine = DerivationEngine::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&catalog),
            config.derivation.max_parallel,
        );
        Self {
            registry,
            store,
            catalog,
            placeholders: Arc::new(PlaceholderResolver::new(&config.placeholder)),
            engine,
        }
    }

    /// Connects to the database, syncs configured types and opens the store.
    ///
    /// Configured types are validated before anything is written; the
    /// registry is then reloaded from the table so rows defined elsewhere
    /// are honored too.
    pub async fn connect(config: &AppConfig) -> Result<(Self, DatabaseConnection), StartupError> {
        let db = database::init_db(&config.database).await?;

        if !config.resource_types.is_empty() {
            let configured = TypeRegistry::from_config(&config.resource_types)?;
            seed::sync_resource_types(&db, &configured).await?;
        }
        let registry = TypeRegistry::load(&db).await?;
        info!(types = registry.len(), "Resource types loaded");

        let store = FilesystemAssetStore::new(
            config.storage.root.clone(),
            config.storage.max_asset_size,
        )
        .await?;
        info!(root = %config.storage.root.display(), "Asset store ready");

        let state = Self::new(
            config,
            Arc::new(registry),
            Arc::new(store),
            Arc::new(DatabaseCatalog::new(db.clone())),
        );
        Ok((state, db))
    }

    /// A fresh per-request cache.
    pub fn cache(&self) -> ResourceCache<'_> {
        ResourceCache::new(&*self.catalog, &self.registry, &self.placeholders)
    }
}
