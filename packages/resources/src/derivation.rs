//! Upload -> root rendition -> cascade of derived renditions.
//!
//! The root type is transcoded from the upload, stored and recorded first.
//! Every descendant type is then derived from its parent's transcoded bytes,
//! one level at a time. Siblings within a level are independent and run on a
//! bounded pool of tasks. Nothing is rolled back on failure: committed
//! records stay, and the error names each missing type and the stage it
//! failed at so the cascade can be re-run with [`DerivationEngine::derive_children`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use common::storage::AssetStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::catalog::{NewResource, ResourceCatalog};
use crate::entity::resource;
use crate::error::ResourceError;
use crate::registry::{ResourceType, TypeRegistry};
use crate::transcode::{CropBox, Transcoded, transcode};

/// Crop fields of an upload. Applied only when all four are present and the
/// box has an area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropFields {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

impl CropFields {
    pub fn crop_box(&self) -> Option<CropBox> {
        match (self.x, self.y, self.w, self.h) {
            (Some(x), Some(y), Some(w), Some(h)) if w > 0 && h > 0 => {
                Some(CropBox::new(x, y, w, h))
            }
            _ => None,
        }
    }
}

impl From<CropBox> for CropFields {
    fn from(crop: CropBox) -> Self {
        Self {
            x: Some(crop.x),
            y: Some(crop.y),
            w: Some(crop.width),
            h: Some(crop.height),
        }
    }
}

/// Options accompanying an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveOptions {
    /// Owning game; absent for orphaned/admin uploads.
    pub game_id: Option<i32>,
    pub user_id: Option<i32>,
    pub product_id: Option<i32>,
    pub site_id: Option<i32>,
    pub crop: Option<CropFields>,
}

impl DeriveOptions {
    pub fn for_game(game_id: i32) -> Self {
        Self {
            game_id: Some(game_id),
            ..Self::default()
        }
    }

    pub fn crop_box(&self) -> Option<CropBox> {
        self.crop.as_ref().and_then(CropFields::crop_box)
    }
}

/// Ownership columns shared by every record of one derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ownership {
    game_id: i32,
    user_id: i32,
    product_id: i32,
    site_id: i32,
}

impl From<&DeriveOptions> for Ownership {
    fn from(options: &DeriveOptions) -> Self {
        Self {
            game_id: options.game_id.unwrap_or(0),
            user_id: options.user_id.unwrap_or(0),
            product_id: options.product_id.unwrap_or(0),
            site_id: options.site_id.unwrap_or(0),
        }
    }
}

impl From<&resource::Model> for Ownership {
    fn from(model: &resource::Model) -> Self {
        Self {
            game_id: model.game_id,
            user_id: model.user_id,
            product_id: model.product_id,
            site_id: model.site_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationStage {
    /// Reading an existing asset or record to derive from.
    Load,
    Transcode,
    Store,
    Persist,
    /// Not attempted because the parent variant failed.
    Skipped,
}

impl fmt::Display for DerivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Transcode => "transcode",
            Self::Store => "store",
            Self::Persist => "persist",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// One rendition that was not committed.
#[derive(Debug)]
pub struct VariantFailure {
    pub type_identifier: String,
    pub stage: DerivationStage,
    pub error: ResourceError,
    /// Set when the bytes were stored but the insert failed; retry
    /// `ResourceCatalog::create` with it instead of re-deriving.
    pub pending: Option<NewResource>,
}

impl VariantFailure {
    fn new(ty: &ResourceType, stage: DerivationStage, error: impl Into<ResourceError>) -> Self {
        Self {
            type_identifier: ty.identifier.clone(),
            stage,
            error: error.into(),
            pending: None,
        }
    }
}

/// The root was committed but some descendants were not.
#[derive(Debug)]
pub struct PartialDerivation {
    pub root: resource::Model,
    /// Descendant records that were committed.
    pub created: Vec<resource::Model>,
    pub failures: Vec<VariantFailure>,
}

impl PartialDerivation {
    /// Identifiers to pass back to [`DerivationEngine::derive_children`].
    pub fn missing_types(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| f.type_identifier.clone())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    /// Nothing was recorded for the requested type.
    #[error("Deriving '{type_identifier}' failed at {stage}: {source}")]
    Root {
        type_identifier: String,
        stage: DerivationStage,
        source: ResourceError,
        pending: Option<NewResource>,
    },

    #[error("{} derived variant(s) failed", .0.failures.len())]
    Partial(Box<PartialDerivation>),

    /// The replacement was recorded but the record it replaces is still
    /// active. Only the soft delete needs retrying.
    #[error("Recorded replacement {} but could not retire resource {replaced}: {source}", .replacement.id)]
    Supersede {
        replaced: i32,
        replacement: Box<resource::Model>,
        source: ResourceError,
    },
}

impl From<VariantFailure> for DeriveError {
    fn from(failure: VariantFailure) -> Self {
        DeriveError::Root {
            type_identifier: failure.type_identifier,
            stage: failure.stage,
            source: failure.error,
            pending: failure.pending,
        }
    }
}

/// Records created by a successful derivation.
#[derive(Debug, Clone)]
pub struct Derivation {
    pub root: resource::Model,
    /// Descendants, level by level in definition order.
    pub children: Vec<resource::Model>,
}

impl Derivation {
    pub fn records(&self) -> impl Iterator<Item = &resource::Model> {
        std::iter::once(&self.root).chain(self.children.iter())
    }

    pub fn into_records(self) -> Vec<resource::Model> {
        std::iter::once(self.root).chain(self.children).collect()
    }
}

#[derive(Clone)]
pub struct DerivationEngine {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn AssetStore>,
    catalog: Arc<dyn ResourceCatalog>,
    max_parallel: usize,
}

impl DerivationEngine {
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn AssetStore>,
        catalog: Arc<dyn ResourceCatalog>,
        max_parallel: usize,
    ) -> Self {
        Self {
            registry,
            store,
            catalog,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Derives the root rendition of `upload` and every descendant type.
    #[instrument(skip(self, upload, options), fields(game_id = options.game_id.unwrap_or(0)))]
    pub async fn derive(
        &self,
        upload: Vec<u8>,
        type_identifier: &str,
        options: &DeriveOptions,
    ) -> Result<Derivation, DeriveError> {
        let root_type = self
            .registry
            .get(type_identifier)
            .ok_or_else(|| DeriveError::UnknownType(type_identifier.to_string()))?
            .clone();
        let owner = Ownership::from(options);

        let transcoded = produce(Arc::new(upload), root_type.clone(), options.crop_box()).await?;
        let root = commit(&*self.store, &*self.catalog, &root_type, &transcoded, owner).await?;

        let (children, failures) = self
            .cascade(&root_type, Arc::new(transcoded.bytes), owner, None)
            .await;

        if failures.is_empty() {
            Ok(Derivation { root, children })
        } else {
            Err(DeriveError::Partial(Box::new(PartialDerivation {
                root,
                created: children,
                failures,
            })))
        }
    }

    /// Re-runs the cascade below an already stored root rendition.
    ///
    /// With `only`, just those descendant types are recorded; ancestors that
    /// lead to them are transcoded again but not stored.
    #[instrument(skip(self, root, only), fields(resource_id = root.id, game_id = root.game_id))]
    pub async fn derive_children(
        &self,
        root: &resource::Model,
        only: Option<&[String]>,
    ) -> Result<Vec<resource::Model>, DeriveError> {
        let root_type = self
            .registry
            .by_id(root.type_id)
            .ok_or_else(|| DeriveError::UnknownType(root.type_id.to_string()))?
            .clone();

        let wanted = match only {
            None => None,
            Some(identifiers) => {
                for identifier in identifiers {
                    if self.registry.get(identifier).is_none() {
                        return Err(DeriveError::UnknownType(identifier.clone()));
                    }
                }
                Some(identifiers.iter().cloned().collect::<HashSet<_>>())
            }
        };

        let bytes = self
            .store
            .get(&root_type.path, &root.source)
            .await
            .map_err(|e| VariantFailure::new(&root_type, DerivationStage::Load, e))?;

        let (created, failures) = self
            .cascade(&root_type, Arc::new(bytes), Ownership::from(root), wanted.as_ref())
            .await;

        if failures.is_empty() {
            Ok(created)
        } else {
            Err(DeriveError::Partial(Box::new(PartialDerivation {
                root: root.clone(),
                created,
                failures,
            })))
        }
    }

    /// Re-renders one resource with a crop box and supersedes it.
    ///
    /// Root types are cropped from their own stored bytes, derived types from
    /// the newest active rendition of their parent type for the same game.
    /// The new record is inserted and the old one soft-deleted.
    #[instrument(skip(self, resource), fields(resource_id = resource.id, game_id = resource.game_id))]
    pub async fn recrop(
        &self,
        resource: &resource::Model,
        crop: CropBox,
    ) -> Result<resource::Model, DeriveError> {
        let ty = self
            .registry
            .by_id(resource.type_id)
            .ok_or_else(|| DeriveError::UnknownType(resource.type_id.to_string()))?
            .clone();

        let (source_type, source_name) = match self.registry.parent(&ty) {
            None => (ty.clone(), resource.source.clone()),
            Some(parent) => {
                let parent_record = self
                    .catalog
                    .list_active_for_entity(resource.game_id)
                    .await
                    .map_err(|e| VariantFailure::new(&ty, DerivationStage::Load, e))?
                    .into_iter()
                    .find(|r| r.type_id == parent.id)
                    .ok_or_else(|| {
                        VariantFailure::new(
                            &ty,
                            DerivationStage::Load,
                            ResourceError::ParentMissing(parent.identifier.clone()),
                        )
                    })?;
                (parent.clone(), parent_record.source)
            }
        };

        let bytes = self
            .store
            .get(&source_type.path, &source_name)
            .await
            .map_err(|e| VariantFailure::new(&ty, DerivationStage::Load, e))?;

        let transcoded = produce(Arc::new(bytes), ty.clone(), Some(crop)).await?;
        let replacement = commit(
            &*self.store,
            &*self.catalog,
            &ty,
            &transcoded,
            Ownership::from(resource),
        )
        .await?;

        if resource.is_active() {
            if let Err(e) = self.catalog.soft_delete(resource.id).await {
                warn!(
                    replaced = resource.id,
                    replacement = replacement.id,
                    error = %e,
                    "Replacement recorded but old resource still active"
                );
                return Err(DeriveError::Supersede {
                    replaced: resource.id,
                    replacement: Box::new(replacement),
                    source: e.into(),
                });
            }
        }

        info!(
            replaced = resource.id,
            replacement = replacement.id,
            %crop,
            "Re-cropped resource"
        );
        Ok(replacement)
    }

    async fn cascade(
        &self,
        root_type: &ResourceType,
        root_bytes: Arc<Vec<u8>>,
        owner: Ownership,
        wanted: Option<&HashSet<String>>,
    ) -> (Vec<resource::Model>, Vec<VariantFailure>) {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut created = Vec::new();
        let mut failures = Vec::new();
        let mut frontier = vec![(root_type.clone(), root_bytes)];

        while !frontier.is_empty() {
            // (type, recorded) per spawned task, in spawn order.
            let mut jobs: Vec<(ResourceType, bool)> = Vec::new();
            let mut tasks = JoinSet::new();

            for (parent, bytes) in &frontier {
                for child in self.registry.children(parent) {
                    let record = wanted.is_none_or(|set| set.contains(&child.identifier));
                    if !record && !self.leads_to_wanted(child, wanted) {
                        continue;
                    }

                    let index = jobs.len();
                    jobs.push((child.clone(), record));

                    let child = child.clone();
                    let bytes = Arc::clone(bytes);
                    let store = Arc::clone(&self.store);
                    let catalog = Arc::clone(&self.catalog);
                    let semaphore = Arc::clone(&semaphore);
                    tasks.spawn(async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        let result = derive_child(&*store, &*catalog, child, bytes, owner, record).await;
                        (index, result)
                    });
                }
            }

            let mut results: Vec<Option<Result<ChildOutput, VariantFailure>>> =
                jobs.iter().map(|_| None).collect();
            let mut join_errors = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => results[index] = Some(result),
                    Err(e) => join_errors.push(e.to_string()),
                }
            }

            let mut next = Vec::new();
            for ((ty, recorded), result) in jobs.into_iter().zip(results) {
                let result = result.unwrap_or_else(|| {
                    let reason = join_errors.join("; ");
                    Err(VariantFailure::new(
                        &ty,
                        DerivationStage::Transcode,
                        ResourceError::Task(reason),
                    ))
                });

                match result {
                    Ok(output) => {
                        created.extend(output.record);
                        next.push((ty, output.bytes));
                    }
                    Err(failure) => {
                        warn!(
                            resource_type = %failure.type_identifier,
                            stage = %failure.stage,
                            error = %failure.error,
                            recorded,
                            "Derived variant failed"
                        );
                        if recorded {
                            failures.push(failure);
                            failures.extend(self.skipped_below(&ty, wanted, || {
                                ResourceError::ParentMissing(ty.identifier.clone())
                            }));
                        } else {
                            // Not a missing variant: its record, if any, predates
                            // this run. Only the selected types below it are.
                            let reason = failure.error.to_string();
                            failures.extend(self.skipped_below(&ty, wanted, || {
                                ResourceError::ParentFailed {
                                    parent: ty.identifier.clone(),
                                    reason: reason.clone(),
                                }
                            }));
                        }
                    }
                }
            }

            frontier = next;
        }

        (created, failures)
    }

    fn leads_to_wanted(&self, ty: &ResourceType, wanted: Option<&HashSet<String>>) -> bool {
        wanted.is_none_or(|set| {
            self.registry
                .descendants(ty)
                .iter()
                .any(|d| set.contains(&d.identifier))
        })
    }

    fn skipped_below(
        &self,
        ty: &ResourceType,
        wanted: Option<&HashSet<String>>,
        cause: impl Fn() -> ResourceError,
    ) -> Vec<VariantFailure> {
        self.registry
            .descendants(ty)
            .into_iter()
            .filter(|d| wanted.is_none_or(|set| set.contains(&d.identifier)))
            .map(|d| VariantFailure::new(d, DerivationStage::Skipped, cause()))
            .collect()
    }
}

struct ChildOutput {
    record: Option<resource::Model>,
    bytes: Arc<Vec<u8>>,
}

async fn derive_child(
    store: &dyn AssetStore,
    catalog: &dyn ResourceCatalog,
    ty: ResourceType,
    parent_bytes: Arc<Vec<u8>>,
    owner: Ownership,
    record: bool,
) -> Result<ChildOutput, VariantFailure> {
    let transcoded = produce(parent_bytes, ty.clone(), None).await?;
    let record = if record {
        Some(commit(store, catalog, &ty, &transcoded, owner).await?)
    } else {
        None
    };
    Ok(ChildOutput {
        record,
        bytes: Arc::new(transcoded.bytes),
    })
}

/// Runs the transcoder off the async runtime.
async fn produce(
    source: Arc<Vec<u8>>,
    ty: ResourceType,
    crop: Option<CropBox>,
) -> Result<Transcoded, VariantFailure> {
    let spec = ty.clone();
    match tokio::task::spawn_blocking(move || transcode(&source, &spec, crop)).await {
        Ok(Ok(transcoded)) => Ok(transcoded),
        Ok(Err(e)) => Err(VariantFailure::new(&ty, DerivationStage::Transcode, e)),
        Err(e) => Err(VariantFailure::new(&ty, DerivationStage::Transcode, e)),
    }
}

/// Stores transcoded bytes under the type's path and records them.
async fn commit(
    store: &dyn AssetStore,
    catalog: &dyn ResourceCatalog,
    ty: &ResourceType,
    transcoded: &Transcoded,
    owner: Ownership,
) -> Result<resource::Model, VariantFailure> {
    let hash = store
        .put(&ty.path, &transcoded.bytes)
        .await
        .map_err(|e| VariantFailure::new(ty, DerivationStage::Store, e))?;

    let new = NewResource {
        type_id: ty.id,
        game_id: owner.game_id,
        user_id: owner.user_id,
        product_id: owner.product_id,
        site_id: owner.site_id,
        source: hash.asset_name(),
        width: transcoded.width as i32,
        height: transcoded.height as i32,
    };

    match catalog.create(new.clone()).await {
        Ok(model) => {
            info!(
                resource_type = %ty.identifier,
                resource_id = model.id,
                source = %model.source,
                width = model.width,
                height = model.height,
                "Stored rendition"
            );
            Ok(model)
        }
        Err(e) => Err(VariantFailure {
            pending: Some(new),
            ..VariantFailure::new(ty, DerivationStage::Persist, e)
        }),
    }
}
