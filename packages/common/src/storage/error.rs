use std::fmt;

/// Errors that can occur during asset storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The requested asset was not found.
    NotFound(String),
    /// Directory creation or a read/write failed.
    Io(std::io::Error),
    /// The asset name is not a content-addressed `<hex>.jpg` name.
    InvalidAssetName(String),
    /// The type path escapes the storage root or is otherwise unusable.
    InvalidTypePath(String),
    /// The asset exceeds the configured size limit.
    SizeLimitExceeded { actual: u64, limit: u64 },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "asset not found: {name}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidAssetName(msg) => write!(f, "invalid asset name: {msg}"),
            Self::InvalidTypePath(msg) => write!(f, "invalid type path: {msg}"),
            Self::SizeLimitExceeded { actual, limit } => {
                write!(f, "asset exceeds size limit ({actual} > {limit} bytes)")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
