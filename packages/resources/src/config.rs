use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

pub use common::config::StorageConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Connection URL. Default: "sqlite://resources.db?mode=rwc".
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Pool size. Default: 10.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://resources.db?mode=rwc".into()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DerivationConfig {
    /// Child variants transcoded at once. Default: 4.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    4
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaceholderConfig {
    /// Used when a game has no platform identifier. Default: "generic".
    #[serde(default = "default_platform")]
    pub default_platform: String,
    /// Type identifier -> file name pattern containing `{platform}`.
    /// Types without an override use `no{type}_{platform}.jpg`.
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_platform() -> String {
    "generic".into()
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            default_platform: default_platform(),
            overrides: HashMap::new(),
        }
    }
}

/// One entry of `[[resource_types]]`.
#[derive(Debug, Deserialize, Clone)]
pub struct ResourceTypeConfig {
    pub id: i32,
    pub identifier: String,
    /// Identifier of the parent type, if any.
    #[serde(default)]
    pub parent: Option<String>,
    pub path: String,
    #[serde(default)]
    pub max_width: u32,
    #[serde(default)]
    pub aspect_ratio: f64,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    90
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub derivation: DerivationConfig,
    #[serde(default)]
    pub placeholder: PlaceholderConfig,
    /// Seeded into the `resource_type` table on startup. When empty the
    /// table is used as-is.
    #[serde(default)]
    pub resource_types: Vec<ResourceTypeConfig>,
}

impl AppConfig {
    /// Loads the file at `config_path` when it exists, then applies
    /// `RESOURCES__SECTION__KEY` environment overrides.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let s = Self::builder()?
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("RESOURCES").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parses a TOML document on top of the defaults, without touching the
    /// environment.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let s = Self::builder()?
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?;

        s.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.url", default_database_url())?
            .set_default("database.max_connections", i64::from(default_max_connections()))?
            .set_default("storage.root", "./storage/resources")?
            .set_default("storage.max_asset_size", 32_i64 * 1024 * 1024)?
            .set_default("derivation.max_parallel", default_max_parallel() as i64)?
            .set_default("placeholder.default_platform", default_platform())
    }
}
