//! Listing handler

use std::path::Path;

use crate::error::ServiceError;
use crate::protocol::FileEntry;
use crate::storage;

/// Enumerates the stored files with metadata.
///
/// Thin wrapper over the storage enumeration; listing failures propagate
/// directly (there is no structured failure shape for this operation).
pub async fn handle_list(storage_root: &Path) -> Result<Vec<FileEntry>, ServiceError> {
    Ok(storage::list_entries(storage_root).await?)
}
