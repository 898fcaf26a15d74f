use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, instrument};

use super::{CatalogError, NewResource, ResourceCatalog};
use crate::entity::resource::{self, ResourceStatus};

/// sea-orm backed catalog over the `resource` table.
#[derive(Clone)]
pub struct DatabaseCatalog {
    db: DatabaseConnection,
}

impl DatabaseCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResourceCatalog for DatabaseCatalog {
    #[instrument(skip(self, new), fields(type_id = new.type_id, game_id = new.game_id))]
    async fn create(&self, new: NewResource) -> Result<resource::Model, CatalogError> {
        let model = resource::ActiveModel {
            type_id: Set(new.type_id),
            game_id: Set(new.game_id),
            user_id: Set(new.user_id),
            product_id: Set(new.product_id),
            site_id: Set(new.site_id),
            source: Set(new.source),
            width: Set(new.width),
            height: Set(new.height),
            status: Set(ResourceStatus::Active),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        Ok(model.insert(&self.db).await?)
    }

    async fn find(&self, id: i32) -> Result<Option<resource::Model>, CatalogError> {
        Ok(resource::Entity::find_by_id(id).one(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, id: i32) -> Result<(), CatalogError> {
        let existing = resource::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(CatalogError::NotFound(id))?;

        if existing.status == ResourceStatus::Deleted {
            debug!("resource already deleted");
            return Ok(());
        }

        let mut model: resource::ActiveModel = existing.into();
        model.status = Set(ResourceStatus::Deleted);
        model.update(&self.db).await?;
        Ok(())
    }

    async fn list_active_for_entity(
        &self,
        game_id: i32,
    ) -> Result<Vec<resource::Model>, CatalogError> {
        Ok(resource::Entity::find()
            .filter(resource::Column::GameId.eq(game_id))
            .filter(resource::Column::Status.eq(ResourceStatus::Active))
            .order_by_desc(resource::Column::Id)
            .all(&self.db)
            .await?)
    }
}
