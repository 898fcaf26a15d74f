use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::info;

use crate::entity::resource_type;
use crate::registry::TypeRegistry;

/// Upsert every configured type into the `resource_type` table.
///
/// Rows are keyed by id; existing rows take the configured values. Rows not
/// present in the registry are left alone.
pub async fn sync_resource_types<C: ConnectionTrait>(
    db: &C,
    registry: &TypeRegistry,
) -> Result<(), DbErr> {
    let mut synced = 0u32;
    for ty in registry.iter() {
        let model = resource_type::ActiveModel {
            id: Set(ty.id),
            identifier: Set(ty.identifier.clone()),
            parent_id: Set(ty.parent_id),
            path: Set(ty.path.clone()),
            max_width: Set(ty.max_width as i32),
            aspect_ratio: Set(ty.aspect_ratio),
            quality: Set(i32::from(ty.quality)),
        };

        resource_type::Entity::insert(model)
            .on_conflict(
                OnConflict::column(resource_type::Column::Id)
                    .update_columns([
                        resource_type::Column::Identifier,
                        resource_type::Column::ParentId,
                        resource_type::Column::Path,
                        resource_type::Column::MaxWidth,
                        resource_type::Column::AspectRatio,
                        resource_type::Column::Quality,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        synced += 1;
    }

    if synced > 0 {
        info!("Synced {} resource types", synced);
    }

    Ok(())
}
