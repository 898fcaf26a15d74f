mod error;
mod hash;
mod path;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use filesystem::FilesystemAssetStore;
pub use hash::{ASSET_EXTENSION, ContentHash};
pub use path::normalize_type_path;
pub use traits::AssetStore;
