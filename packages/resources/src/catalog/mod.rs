//! Persisted records linking a game to a stored rendition.
//!
//! Records are append-only; `soft_delete` is the only mutation and every
//! read path filters on [`ResourceStatus::Active`].

mod database;
mod memory;

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::resource::{self, ResourceStatus};

pub use database::DatabaseCatalog;
pub use memory::MemoryCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error("Resource {0} not found")]
    NotFound(i32),
}

/// Everything needed to insert a record. Kept by callers so a failed insert
/// can be retried without re-deriving the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResource {
    pub type_id: i32,
    pub game_id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub site_id: i32,
    pub source: String,
    pub width: i32,
    pub height: i32,
}

#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Insert an active record.
    async fn create(&self, new: NewResource) -> Result<resource::Model, CatalogError>;

    /// Look up a record regardless of status.
    async fn find(&self, id: i32) -> Result<Option<resource::Model>, CatalogError>;

    /// Mark a record deleted. Its row and bytes are kept.
    async fn soft_delete(&self, id: i32) -> Result<(), CatalogError>;

    /// Active records of a game, newest id first.
    async fn list_active_for_entity(
        &self,
        game_id: i32,
    ) -> Result<Vec<resource::Model>, CatalogError>;
}

pub(crate) fn is_listed(model: &resource::Model, game_id: i32) -> bool {
    model.game_id == game_id && model.status == ResourceStatus::Active
}
