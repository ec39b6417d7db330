//! Storage operations
//!
//! File system enumeration for the listing operation. The storage root is a
//! flat namespace: one regular file per stored file, no index or manifest —
//! the directory itself is the source of truth on every query.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::StorageError;
use crate::protocol::FileEntry;

/// Enumerates the stored files under `storage_root` with metadata.
///
/// Entries come back in the underlying directory enumeration's order (not
/// sorted). Subdirectories are excluded. An entry whose metadata cannot be
/// read at enumeration time is skipped rather than failing the whole call;
/// that is a benign race against concurrent creation or deletion. An empty
/// root yields an empty list.
pub async fn list_entries(storage_root: &Path) -> Result<Vec<FileEntry>, StorageError> {
    let mut dir = tokio::fs::read_dir(storage_root).await?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {}: metadata unreadable: {}", name, e);
                continue;
            }
        };

        if metadata.is_dir() {
            continue;
        }

        // No separate creation time is tracked; mtime stands in for both.
        let modified = match metadata.modified() {
            Ok(time) => format_timestamp(time),
            Err(e) => {
                debug!("Skipping {}: no modification time: {}", name, e);
                continue;
            }
        };

        entries.push(FileEntry {
            filename: name,
            created_at: modified.clone(),
            modified_at: modified,
            size_bytes: metadata.len(),
        });
    }

    info!(
        "Listed storage root {} - {} entries",
        storage_root.display(),
        entries.len()
    );

    Ok(entries)
}

/// Formats a filesystem timestamp as RFC3339 in UTC
fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}
