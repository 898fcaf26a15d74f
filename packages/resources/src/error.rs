use common::storage::StorageError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::transcode::TranscodeError;

/// Failure of a single step in producing or persisting a rendition.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Storage write error: {0}")]
    StorageWrite(#[from] StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] CatalogError),

    /// The parent variant was not produced, so this one could not be derived.
    #[error("Parent variant '{0}' was not derived")]
    ParentMissing(String),

    /// An ancestor that was derived only as an intermediate step failed.
    #[error("Intermediate variant '{parent}' failed: {reason}")]
    ParentFailed { parent: String, reason: String },

    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ResourceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ResourceError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResourceError>;

/// Failure while wiring up an [`AppState`](crate::state::AppState).
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("Resource type error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
