//! Resource type specifications and the parent/child edges between them.
//!
//! Types are plain data: a lookup table plus an index from parent id to the
//! ids of its children, in definition order.

use std::collections::HashMap;

use common::storage::normalize_type_path;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, QueryOrder};
use serde::Serialize;
use thiserror::Error;

use crate::config::ResourceTypeConfig;
use crate::entity::resource_type;
use crate::error::ResourceError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid resource type '{identifier}': {reason}")]
    InvalidType { identifier: String, reason: String },

    #[error("Duplicate resource type identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Duplicate resource type id: {0}")]
    DuplicateId(i32),

    #[error("Resource type '{identifier}' names unknown parent '{parent}'")]
    UnknownParent { identifier: String, parent: String },

    #[error("Resource type '{0}' is its own ancestor")]
    Cycle(String),

    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

/// Largest width or height a type may ask a rendition to have.
pub const MAX_DIMENSION: u32 = 16_384;

/// Size specification of one kind of rendition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceType {
    pub id: i32,
    pub identifier: String,
    /// `None` for root (master) types.
    pub parent_id: Option<i32>,
    /// Storage sub-path, relative to the storage root.
    pub path: String,
    /// 0 = unconstrained.
    pub max_width: u32,
    /// Width / height. 0 = keep the source aspect.
    pub aspect_ratio: f64,
    /// JPEG encode quality, 1-100.
    pub quality: u8,
}

impl ResourceType {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Height of the target box, when the type constrains the aspect ratio.
    pub fn target_height(&self) -> Option<u32> {
        if self.max_width == 0 || self.aspect_ratio <= 0.0 {
            return None;
        }
        Some((f64::from(self.max_width) / self.aspect_ratio).round() as u32)
    }

    /// Renders the aspect ratio as a reduced `W:H` pair, e.g. `3:4`.
    ///
    /// `None` when either the width or the aspect ratio is unconstrained.
    pub fn aspect_ratio_label(&self) -> Option<String> {
        let width = u64::from(self.max_width);
        let height = u64::from(self.target_height()?);
        if height == 0 {
            return None;
        }
        let divisor = gcd(width, height);
        Some(format!("{}:{}", width / divisor, height / divisor))
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidType {
            identifier: self.identifier.clone(),
            reason,
        };

        if self.identifier.trim().is_empty() {
            return Err(invalid("identifier cannot be empty".into()));
        }
        if !self.aspect_ratio.is_finite() || self.aspect_ratio < 0.0 {
            return Err(invalid(format!(
                "aspect ratio must be a non-negative number, got {}",
                self.aspect_ratio
            )));
        }
        if self.max_width > MAX_DIMENSION {
            return Err(invalid(format!(
                "max width {} exceeds {MAX_DIMENSION}",
                self.max_width
            )));
        }
        if self.max_width > 0 && self.aspect_ratio > 0.0 {
            let height = (f64::from(self.max_width) / self.aspect_ratio).round();
            if !(1.0..=f64::from(MAX_DIMENSION)).contains(&height) {
                return Err(invalid(format!(
                    "aspect ratio {} gives a target height of {height}, outside 1-{MAX_DIMENSION}",
                    self.aspect_ratio
                )));
            }
        }
        if !(1..=100).contains(&self.quality) {
            return Err(invalid(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        normalize_type_path(&self.path).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}

impl TryFrom<resource_type::Model> for ResourceType {
    type Error = RegistryError;

    fn try_from(model: resource_type::Model) -> Result<Self, Self::Error> {
        let invalid = |reason: String| RegistryError::InvalidType {
            identifier: model.identifier.clone(),
            reason,
        };
        let max_width = u32::try_from(model.max_width)
            .map_err(|_| invalid(format!("negative max width {}", model.max_width)))?;
        let quality = u8::try_from(model.quality)
            .map_err(|_| invalid(format!("quality out of range: {}", model.quality)))?;

        Ok(Self {
            id: model.id,
            identifier: model.identifier,
            parent_id: model.parent_id,
            path: model.path,
            max_width,
            aspect_ratio: model.aspect_ratio,
            quality,
        })
    }
}

/// Greatest common divisor (iterative Euclid). `gcd(n, 0) == n`.
pub fn gcd(mut m: u64, mut n: u64) -> u64 {
    while n != 0 {
        (m, n) = (n, m % n);
    }
    m
}

/// The set of known resource types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<ResourceType>,
    by_identifier: HashMap<String, usize>,
    by_id: HashMap<i32, usize>,
    children: HashMap<i32, Vec<usize>>,
}

impl TypeRegistry {
    pub fn new(types: Vec<ResourceType>) -> Result<Self, RegistryError> {
        let mut by_identifier = HashMap::with_capacity(types.len());
        let mut by_id = HashMap::with_capacity(types.len());

        for (idx, ty) in types.iter().enumerate() {
            ty.validate()?;
            if by_identifier.insert(ty.identifier.clone(), idx).is_some() {
                return Err(RegistryError::DuplicateIdentifier(ty.identifier.clone()));
            }
            if by_id.insert(ty.id, idx).is_some() {
                return Err(RegistryError::DuplicateId(ty.id));
            }
        }

        let mut children: HashMap<i32, Vec<usize>> = HashMap::new();
        for (idx, ty) in types.iter().enumerate() {
            let Some(parent_id) = ty.parent_id else {
                continue;
            };
            if !by_id.contains_key(&parent_id) {
                return Err(RegistryError::UnknownParent {
                    identifier: ty.identifier.clone(),
                    parent: parent_id.to_string(),
                });
            }
            children.entry(parent_id).or_default().push(idx);
        }

        // A chain longer than the number of types must revisit one of them.
        for ty in &types {
            let mut current = ty.parent_id;
            let mut steps = 0;
            while let Some(parent_id) = current {
                steps += 1;
                if parent_id == ty.id || steps > types.len() {
                    return Err(RegistryError::Cycle(ty.identifier.clone()));
                }
                current = types[by_id[&parent_id]].parent_id;
            }
        }

        Ok(Self {
            types,
            by_identifier,
            by_id,
            children,
        })
    }

    /// Builds the registry from configuration, resolving parents by identifier.
    pub fn from_config(configs: &[ResourceTypeConfig]) -> Result<Self, RegistryError> {
        let ids: HashMap<&str, i32> = configs
            .iter()
            .map(|c| (c.identifier.as_str(), c.id))
            .collect();

        let types = configs
            .iter()
            .map(|c| -> Result<ResourceType, RegistryError> {
                let parent_id = match c.parent.as_deref() {
                    None => None,
                    Some(parent) => Some(*ids.get(parent).ok_or_else(|| {
                        RegistryError::UnknownParent {
                            identifier: c.identifier.clone(),
                            parent: parent.to_string(),
                        }
                    })?),
                };
                Ok(ResourceType {
                    id: c.id,
                    identifier: c.identifier.clone(),
                    parent_id,
                    path: c.path.clone(),
                    max_width: c.max_width,
                    aspect_ratio: c.aspect_ratio,
                    quality: c.quality,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        Self::new(types)
    }

    /// Loads every row of the `resource_type` table, in id order.
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, RegistryError> {
        let models = resource_type::Entity::find()
            .order_by_asc(resource_type::Column::Id)
            .all(db)
            .await?;

        let types = models
            .into_iter()
            .map(ResourceType::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(types)
    }

    pub fn resolve(&self, identifier: &str) -> Result<&ResourceType, ResourceError> {
        self.get(identifier)
            .ok_or_else(|| ResourceError::UnknownType(identifier.to_string()))
    }

    pub fn get(&self, identifier: &str) -> Option<&ResourceType> {
        self.by_identifier.get(identifier).map(|&idx| &self.types[idx])
    }

    pub fn by_id(&self, id: i32) -> Option<&ResourceType> {
        self.by_id.get(&id).map(|&idx| &self.types[idx])
    }

    /// Direct children of `ty`, in definition order.
    pub fn children(&self, ty: &ResourceType) -> Vec<&ResourceType> {
        self.children
            .get(&ty.id)
            .map(|idxs| idxs.iter().map(|&idx| &self.types[idx]).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, ty: &ResourceType) -> Option<&ResourceType> {
        ty.parent_id.and_then(|id| self.by_id(id))
    }

    /// Every type derived from `ty`, level by level.
    pub fn descendants(&self, ty: &ResourceType) -> Vec<&ResourceType> {
        let mut out = self.children(ty);
        let mut next = 0;
        while next < out.len() {
            let grandchildren = self.children(out[next]);
            out.extend(grandchildren);
            next += 1;
        }
        out
    }

    pub fn aspect_ratio_label(&self, ty: &ResourceType) -> Option<String> {
        ty.aspect_ratio_label()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
