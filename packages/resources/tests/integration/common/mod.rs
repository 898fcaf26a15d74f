use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use tempfile::TempDir;

use common::storage::{AssetStore, FilesystemAssetStore};
use resources::catalog::{CatalogError, MemoryCatalog, NewResource, ResourceCatalog};
use resources::config::AppConfig;
use resources::entity::resource;
use resources::registry::TypeRegistry;
use resources::state::AppState;

/// Type tree used across the tests:
///
/// boxart (300, 3:4) -> boxart_thumb (100, 3:4) -> boxart_icon (32, 1:1)
/// screenshot (640, free) -> screenshot_small (160, free)
/// splash (640, 16:9) -> splash_medium (320, 16:9)
///                    -> splash_small (160, 16:9)
pub const CONFIG: &str = r#"
[derivation]
max_parallel = 2

[[resource_types]]
id = 1
identifier = "boxart"
path = "boxart"
max_width = 300
aspect_ratio = 0.75

[[resource_types]]
id = 2
identifier = "boxart_thumb"
parent = "boxart"
path = "boxart/thumb"
max_width = 100
aspect_ratio = 0.75
quality = 80

[[resource_types]]
id = 3
identifier = "boxart_icon"
parent = "boxart_thumb"
path = "boxart/icon"
max_width = 32
aspect_ratio = 1.0

[[resource_types]]
id = 4
identifier = "screenshot"
path = "screenshot"
max_width = 640

[[resource_types]]
id = 5
identifier = "screenshot_small"
parent = "screenshot"
path = "screenshot/small"
max_width = 160

[[resource_types]]
id = 6
identifier = "splash"
path = "splash"
max_width = 640
aspect_ratio = 1.7777777777777777

[[resource_types]]
id = 7
identifier = "splash_medium"
parent = "splash"
path = "splash/medium"
max_width = 320
aspect_ratio = 1.7777777777777777

[[resource_types]]
id = 8
identifier = "splash_small"
parent = "splash"
path = "splash/small"
max_width = 160
aspect_ratio = 1.7777777777777777
"#;

pub const BOXART: i32 = 1;
pub const BOXART_THUMB: i32 = 2;
pub const BOXART_ICON: i32 = 3;
pub const SPLASH: i32 = 6;
pub const SPLASH_MEDIUM: i32 = 7;
pub const SPLASH_SMALL: i32 = 8;

/// A state wired to a temp-dir store and an in-process catalog.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<FilesystemAssetStore>,
    pub catalog: Arc<FlakyCatalog>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_limit(32 * 1024 * 1024).await
    }

    pub async fn spawn_with_limit(max_asset_size: u64) -> Self {
        let config = AppConfig::from_toml(CONFIG).expect("Failed to parse test config");
        Self::build(config, max_asset_size).await
    }

    pub async fn spawn_with_parallelism(max_parallel: usize) -> Self {
        let mut config = AppConfig::from_toml(CONFIG).expect("Failed to parse test config");
        config.derivation.max_parallel = max_parallel;
        Self::build(config, 32 * 1024 * 1024).await
    }

    async fn build(config: AppConfig, max_asset_size: u64) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = TypeRegistry::from_config(&config.resource_types)
            .expect("Failed to build registry");

        let store = Arc::new(
            FilesystemAssetStore::new(dir.path().join("resources"), max_asset_size)
                .await
                .expect("Failed to create store"),
        );
        let catalog = Arc::new(FlakyCatalog::default());

        let state = AppState::new(
            &config,
            Arc::new(registry),
            Arc::clone(&store) as Arc<dyn AssetStore>,
            Arc::clone(&catalog) as Arc<dyn ResourceCatalog>,
        );

        Self {
            state,
            store,
            catalog,
            _dir: dir,
        }
    }

    /// Every record ever inserted, in insertion order.
    pub async fn records(&self) -> Vec<resource::Model> {
        self.catalog.inner.snapshot().await
    }

    pub async fn records_of_type(&self, type_id: i32) -> Vec<resource::Model> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.type_id == type_id)
            .collect()
    }
}

/// Memory catalog whose inserts can be made to fail per type, and whose
/// soft deletes can be made to fail altogether.
#[derive(Default)]
pub struct FlakyCatalog {
    pub inner: MemoryCatalog,
    failing_types: Mutex<HashSet<i32>>,
    failing_deletes: AtomicBool,
}

impl FlakyCatalog {
    pub fn fail_inserts_for(&self, type_id: i32) {
        self.failing_types.lock().unwrap().insert(type_id);
    }

    pub fn fail_deletes(&self) {
        self.failing_deletes.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing_types.lock().unwrap().clear();
        self.failing_deletes.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceCatalog for FlakyCatalog {
    async fn create(&self, new: NewResource) -> Result<resource::Model, CatalogError> {
        let failing = self.failing_types.lock().unwrap().contains(&new.type_id);
        if failing {
            return Err(CatalogError::Db(sea_orm::DbErr::Custom(
                "insert rejected".into(),
            )));
        }
        self.inner.create(new).await
    }

    async fn find(&self, id: i32) -> Result<Option<resource::Model>, CatalogError> {
        self.inner.find(id).await
    }

    async fn soft_delete(&self, id: i32) -> Result<(), CatalogError> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::Db(sea_orm::DbErr::Custom(
                "delete rejected".into(),
            )));
        }
        self.inner.soft_delete(id).await
    }

    async fn list_active_for_entity(
        &self,
        game_id: i32,
    ) -> Result<Vec<resource::Model>, CatalogError> {
        self.inner.list_active_for_entity(game_id).await
    }
}

/// A PNG with a gradient, so crops and resizes are not degenerate.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let buffer = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    buffer
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

pub fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).expect("Failed to decode asset");
    (img.width(), img.height())
}
