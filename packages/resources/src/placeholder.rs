use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PlaceholderConfig;
use crate::entity::resource::{self, ResourceStatus};

/// The game a rendition is requested for, as known to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameRef {
    pub id: i32,
    /// Platform identifier (e.g. "ps2"), used to pick a generic placeholder.
    pub platform: String,
}

impl GameRef {
    pub fn new(id: i32, platform: impl Into<String>) -> Self {
        Self {
            id,
            platform: platform.into(),
        }
    }
}

/// Builds the synthetic record returned when a game has no active rendition
/// of a type. Placeholders are never inserted into the catalog.
#[derive(Debug, Clone)]
pub struct PlaceholderResolver {
    default_platform: String,
    overrides: HashMap<String, String>,
}

impl PlaceholderResolver {
    pub fn new(config: &PlaceholderConfig) -> Self {
        Self {
            default_platform: config.default_platform.clone(),
            overrides: config.overrides.clone(),
        }
    }

    /// `no{type}_{platform}.jpg` unless the type has an override pattern.
    pub fn asset_name(&self, type_identifier: &str, platform: &str) -> String {
        let platform = match platform.trim() {
            "" => self.default_platform.as_str(),
            p => p,
        };
        match self.overrides.get(type_identifier) {
            Some(pattern) => pattern.replace("{platform}", platform),
            None => format!("no{type_identifier}_{platform}.jpg"),
        }
    }

    /// Unsaved record (id 0) pointing at the generic asset.
    pub fn resolve(&self, type_id: i32, type_identifier: &str, game: &GameRef) -> resource::Model {
        resource::Model {
            id: 0,
            type_id,
            game_id: game.id,
            user_id: 0,
            product_id: 0,
            site_id: 0,
            source: self.asset_name(type_identifier, &game.platform),
            width: 0,
            height: 0,
            status: ResourceStatus::Active,
            created_at: DateTime::<Utc>::default(),
        }
    }
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new(&PlaceholderConfig::default())
    }
}
