use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{CatalogError, NewResource, ResourceCatalog, is_listed};
use crate::entity::resource::{self, ResourceStatus};

/// Process-local catalog. Ids start at 1 and increase with each insert.
#[derive(Default)]
pub struct MemoryCatalog {
    rows: Mutex<Vec<resource::Model>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever inserted, deleted ones included.
    pub async fn snapshot(&self) -> Vec<resource::Model> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl ResourceCatalog for MemoryCatalog {
    async fn create(&self, new: NewResource) -> Result<resource::Model, CatalogError> {
        let mut rows = self.rows.lock().await;
        let model = resource::Model {
            id: rows.len() as i32 + 1,
            type_id: new.type_id,
            game_id: new.game_id,
            user_id: new.user_id,
            product_id: new.product_id,
            site_id: new.site_id,
            source: new.source,
            width: new.width,
            height: new.height,
            status: ResourceStatus::Active,
            created_at: Utc::now(),
        };
        rows.push(model.clone());
        Ok(model)
    }

    async fn find(&self, id: i32) -> Result<Option<resource::Model>, CatalogError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn soft_delete(&self, id: i32) -> Result<(), CatalogError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CatalogError::NotFound(id))?;
        row.status = ResourceStatus::Deleted;
        Ok(())
    }

    async fn list_active_for_entity(
        &self,
        game_id: i32,
    ) -> Result<Vec<resource::Model>, CatalogError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|r| is_listed(r, game_id))
            .cloned()
            .collect())
    }
}
