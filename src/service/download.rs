//! Download handler
//!
//! Reads a stored file and emits it as an ordered sequence of bounded
//! chunks. Every call re-opens the file from offset zero; there is no
//! session state across calls.

use std::io::ErrorKind;
use std::path::Path;

use log::{error, info};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::error::{ServiceError, StorageError, StreamError};
use crate::protocol::FileChunk;
use crate::storage::sanitize;

/// Streams `filename` from the storage root into `chunks`.
///
/// The filename is sanitized first; an unusable name fails before any file
/// access, and a missing file fails before any chunk is emitted. Chunks are
/// sent in file order, at most `chunk_size` bytes each; zero-length reads
/// are not emitted. A mid-stream read error stops emission and propagates —
/// chunks already sent are not retracted, so the receiver must treat a
/// truncated stream as a failed transfer.
pub async fn handle_download(
    storage_root: &Path,
    chunk_size: usize,
    filename: &str,
    chunks: mpsc::Sender<FileChunk>,
) -> Result<(), ServiceError> {
    let safe = sanitize(filename);
    if safe.is_empty() {
        return Err(StorageError::InvalidFilename(filename.to_string()).into());
    }

    let path = storage_root.join(&safe);
    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StorageError::NotFound(safe).into());
        }
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            return Err(StorageError::Io(e).into());
        }
    };

    let mut buffer = vec![0u8; chunk_size];
    let mut bytes_sent = 0u64;

    loop {
        let n = match file.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("Read error on {}: {}", safe, e);
                return Err(StorageError::Io(e).into());
            }
        };

        chunks
            .send(FileChunk {
                data: buffer[..n].to_vec(),
            })
            .await
            .map_err(|_| StreamError::Send("receiver dropped".into()))?;

        bytes_sent += n as u64;
    }

    info!("Download completed: {} ({} bytes)", safe, bytes_sent);
    Ok(())
}
