use super::error::StorageError;

/// Normalizes a configured type path: surrounding whitespace and separators
/// are trimmed so `"/boxart/"`, `"boxart/"` and `"boxart"` name the same
/// directory under the storage root.
pub fn normalize_type_path(path: &str) -> Result<&str, StorageError> {
    let trimmed = path.trim().trim_matches(|c| c == '/' || c == '\\');

    if trimmed.is_empty() {
        return Err(StorageError::InvalidTypePath("type path cannot be empty".into()));
    }

    if trimmed.contains('\0') {
        return Err(StorageError::InvalidTypePath(format!(
            "{path:?} contains a null byte"
        )));
    }

    if contains_path_traversal(trimmed) {
        return Err(StorageError::InvalidTypePath(format!(
            "{path:?} contains '..'"
        )));
    }

    Ok(trimmed)
}

/// Checks if a path string contains path traversal patterns.
fn contains_path_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}
