//! Request-scoped grouping of a game's active renditions by type.
//!
//! A [`ResourceCache`] is built per request and dropped with it. Each game's
//! grouping is loaded once, on first use, and only reloaded on an explicit
//! refresh; it is not shared across requests.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::{CatalogError, ResourceCatalog};
use crate::entity::resource;
use crate::placeholder::{GameRef, PlaceholderResolver};
use crate::registry::TypeRegistry;

/// Type identifier -> active records, newest id first.
pub type GroupedResources = HashMap<String, Vec<resource::Model>>;

/// The rendition to show for a game and type.
#[derive(Debug, Clone, PartialEq)]
pub enum Primary<'a> {
    Stored(&'a resource::Model),
    /// Nothing active exists; this record was never persisted.
    Placeholder(resource::Model),
}

impl Primary<'_> {
    pub fn resource(&self) -> &resource::Model {
        match self {
            Primary::Stored(model) => model,
            Primary::Placeholder(model) => model,
        }
    }

    pub fn asset_name(&self) -> &str {
        &self.resource().source
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Primary::Placeholder(_))
    }
}

pub struct ResourceCache<'a> {
    catalog: &'a dyn ResourceCatalog,
    registry: &'a TypeRegistry,
    placeholders: &'a PlaceholderResolver,
    entries: HashMap<i32, GroupedResources>,
}

impl<'a> ResourceCache<'a> {
    pub fn new(
        catalog: &'a dyn ResourceCatalog,
        registry: &'a TypeRegistry,
        placeholders: &'a PlaceholderResolver,
    ) -> Self {
        Self {
            catalog,
            registry,
            placeholders,
            entries: HashMap::new(),
        }
    }

    /// Grouping for `game_id`, loaded on first use or when `force_refresh`.
    pub async fn for_entity(
        &mut self,
        game_id: i32,
        force_refresh: bool,
    ) -> Result<&GroupedResources, CatalogError> {
        if force_refresh || !self.entries.contains_key(&game_id) {
            let grouped = self.build(game_id).await?;
            self.entries.insert(game_id, grouped);
        }
        Ok(&self.entries[&game_id])
    }

    pub async fn refresh(&mut self, game_id: i32) -> Result<&GroupedResources, CatalogError> {
        self.for_entity(game_id, true).await
    }

    /// Newest active rendition, or a placeholder when there is none.
    pub async fn primary(
        &mut self,
        game: &GameRef,
        type_identifier: &str,
    ) -> Result<Primary<'_>, CatalogError> {
        let registry = self.registry;
        let placeholders = self.placeholders;
        let grouped = self.for_entity(game.id, false).await?;

        if let Some(first) = grouped.get(type_identifier).and_then(|list| list.first()) {
            return Ok(Primary::Stored(first));
        }

        let type_id = registry.get(type_identifier).map_or(0, |t| t.id);
        Ok(Primary::Placeholder(placeholders.resolve(
            type_id,
            type_identifier,
            game,
        )))
    }

    /// Every active rendition of a type, newest first. Empty when none.
    pub async fn all(
        &mut self,
        game_id: i32,
        type_identifier: &str,
    ) -> Result<&[resource::Model], CatalogError> {
        let grouped = self.for_entity(game_id, false).await?;
        Ok(grouped
            .get(type_identifier)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    async fn build(&self, game_id: i32) -> Result<GroupedResources, CatalogError> {
        let records = self.catalog.list_active_for_entity(game_id).await?;
        let mut grouped = GroupedResources::new();

        for record in records.into_iter().filter(resource::Model::is_active) {
            let Some(ty) = self.registry.by_id(record.type_id) else {
                warn!(
                    resource_id = record.id,
                    type_id = record.type_id,
                    "Skipping resource of unknown type"
                );
                continue;
            };
            grouped
                .entry(ty.identifier.clone())
                .or_default()
                .push(record);
        }

        // Keep newest-first regardless of the catalog's own ordering.
        for list in grouped.values_mut() {
            list.sort_by(|a, b| b.id.cmp(&a.id));
        }

        debug!(game_id, types = grouped.len(), "Built resource cache entry");
        Ok(grouped)
    }
}
