use sea_orm::{DatabaseConnection, EntityTrait};

use resources::catalog::{CatalogError, DatabaseCatalog, NewResource, ResourceCatalog};
use resources::config::{AppConfig, DatabaseConfig};
use resources::database::init_db;
use resources::entity::resource::ResourceStatus;
use resources::entity::resource_type;
use resources::registry::TypeRegistry;
use resources::seed::sync_resource_types;

use crate::common::{BOXART, BOXART_THUMB, CONFIG, png};

/// A private in-memory SQLite database. One connection, so every query
/// sees the same database.
async fn sqlite() -> DatabaseConnection {
    init_db(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    })
    .await
    .expect("Failed to initialize SQLite database")
}

fn draft(type_id: i32, game_id: i32, source: &str) -> NewResource {
    NewResource {
        type_id,
        game_id,
        user_id: 5,
        product_id: 0,
        site_id: 2,
        source: source.to_string(),
        width: 300,
        height: 400,
    }
}

mod database_catalog {
    use super::*;

    #[tokio::test]
    async fn create_then_find() {
        let catalog = DatabaseCatalog::new(sqlite().await);
        let created = catalog.create(draft(BOXART, 42, "a.jpg")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.status, ResourceStatus::Active);

        let found = catalog.find(created.id).await.unwrap().unwrap();
        assert_eq!(found.source, "a.jpg");
        assert_eq!(found.site_id, 2);
        assert!(catalog.find(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_active_and_newest_first() {
        let catalog = DatabaseCatalog::new(sqlite().await);
        let a = catalog.create(draft(BOXART, 42, "a.jpg")).await.unwrap();
        catalog.create(draft(BOXART, 43, "other.jpg")).await.unwrap();
        let b = catalog.create(draft(BOXART_THUMB, 42, "b.jpg")).await.unwrap();
        let c = catalog.create(draft(BOXART, 42, "c.jpg")).await.unwrap();
        catalog.soft_delete(b.id).await.unwrap();

        let ids: Vec<_> = catalog
            .list_active_for_entity(42)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, [c.id, a.id]);
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let catalog = DatabaseCatalog::new(sqlite().await);
        let a = catalog.create(draft(BOXART, 42, "a.jpg")).await.unwrap();

        catalog.soft_delete(a.id).await.unwrap();
        catalog.soft_delete(a.id).await.unwrap();

        let kept = catalog.find(a.id).await.unwrap().unwrap();
        assert_eq!(kept.status, ResourceStatus::Deleted);
    }

    #[tokio::test]
    async fn soft_delete_unknown_id() {
        let catalog = DatabaseCatalog::new(sqlite().await);
        assert!(matches!(
            catalog.soft_delete(7).await,
            Err(CatalogError::NotFound(7))
        ));
    }
}

mod resource_types {
    use super::*;

    #[tokio::test]
    async fn synced_types_load_back() {
        let db = sqlite().await;
        let config = AppConfig::from_toml(CONFIG).unwrap();
        let configured = TypeRegistry::from_config(&config.resource_types).unwrap();

        sync_resource_types(&db, &configured).await.unwrap();
        let loaded = TypeRegistry::load(&db).await.unwrap();

        assert_eq!(loaded.len(), configured.len());
        for ty in configured.iter() {
            assert_eq!(loaded.get(&ty.identifier), Some(ty));
        }
        let boxart = loaded.get("boxart").unwrap();
        let children: Vec<_> = loaded
            .children(boxart)
            .iter()
            .map(|t| t.identifier.as_str())
            .collect();
        assert_eq!(children, ["boxart_thumb"]);
    }

    #[tokio::test]
    async fn resync_updates_existing_rows() {
        let db = sqlite().await;
        let mut config = AppConfig::from_toml(CONFIG).unwrap();
        let registry = TypeRegistry::from_config(&config.resource_types).unwrap();
        sync_resource_types(&db, &registry).await.unwrap();

        config.resource_types[0].quality = 60;
        let registry = TypeRegistry::from_config(&config.resource_types).unwrap();
        sync_resource_types(&db, &registry).await.unwrap();

        let rows = resource_type::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), config.resource_types.len());
        let boxart = resource_type::Entity::find_by_id(BOXART)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(boxart.quality, 60);
    }
}

mod startup {
    use super::*;
    use resources::derivation::DeriveOptions;
    use resources::placeholder::GameRef;
    use resources::state::AppState;

    #[tokio::test]
    async fn connected_state_derives_into_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::from_toml(CONFIG).unwrap();
        config.database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        config.storage.root = dir.path().join("resources");

        let (state, db) = AppState::connect(&config).await.expect("connect");
        assert_eq!(state.registry.len(), 8);

        let derivation = state
            .engine
            .derive(png(1200, 1600), "boxart", &DeriveOptions::for_game(42))
            .await
            .unwrap();
        assert_eq!(derivation.children.len(), 2);

        let rows = resources::entity::resource::Entity::find()
            .all(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);

        let mut cache = state.cache();
        let primary = cache
            .primary(&GameRef::new(42, "ps2"), "boxart")
            .await
            .unwrap();
        assert_eq!(primary.resource().id, derivation.root.id);
        assert!(dir.path().join("resources/boxart").join(&derivation.root.source).exists());
    }
}
