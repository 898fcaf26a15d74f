use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_type")]
pub struct Model {
    /// Assigned by configuration, not by the database.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    /// Stable key used by callers (e.g. "boxart").
    #[sea_orm(unique)]
    pub identifier: String,

    /// NULL for root (master) types.
    pub parent_id: Option<i32>,

    /// Sub-directory under the storage root.
    pub path: String,

    /// 0 = unconstrained.
    pub max_width: i32,

    /// Width / height. 0 = keep the source aspect.
    #[sea_orm(column_type = "Double")]
    pub aspect_ratio: f64,

    /// JPEG encode quality, 1-100.
    pub quality: i32,
}

impl ActiveModelBehavior for ActiveModel {}
