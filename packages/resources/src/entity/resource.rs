use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a catalog record. Deletion only ever moves a row to `Deleted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    #[sea_orm(num_value = 0)]
    Active,
    #[sea_orm(num_value = 9)]
    Deleted,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource")]
pub struct Model {
    /// Assignment order is creation order.
    #[sea_orm(primary_key)]
    pub id: i32,

    /// References `resource_type.id`.
    pub type_id: i32,

    /// Owning game. 0 for orphaned/admin uploads.
    pub game_id: i32,
    /// Uploader. 0 when unknown.
    pub user_id: i32,
    pub product_id: i32,
    pub site_id: i32,

    /// Content-addressed asset name within the type's directory.
    pub source: String,

    pub width: i32,
    pub height: i32,

    pub status: ResourceStatus,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == ResourceStatus::Active
    }
}
