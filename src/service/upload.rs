//! Upload handler
//!
//! Consumes an inbound stream of chunks and materializes a stored file.
//! Uploads are atomic: chunks are written to a temporary file next to the
//! target, which is renamed over the target on clean end-of-stream and
//! removed on every failure path. A re-upload under an existing name
//! therefore fully replaces the prior content, and a failed upload leaves
//! any previous version of the target intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::{ServiceError, StreamError};
use crate::protocol::{UploadChunk, UploadReply};
use crate::storage::sanitize;

/// Distinguishes temp files of concurrent sessions within one process
static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Opens a fresh temp file for one upload session.
///
/// The name embeds the process id and a session counter, and the file is
/// opened `create_new`, so a session can never truncate a stored file or
/// another session's in-progress temp file — a name collision simply moves
/// on to the next counter value.
async fn create_temp(storage_root: &Path, safe: &str) -> std::io::Result<(File, PathBuf)> {
    loop {
        let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = storage_root.join(format!(".{safe}.{}.{seq}.tmp", std::process::id()));

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
        {
            Ok(file) => return Ok((file, temp_path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// An upload session that has fixed its target and opened a temp file
struct OpenUpload {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    filename: String,
    bytes_received: u64,
}

impl OpenUpload {
    /// Closes the temp file and deletes it, leaving no partial state behind
    async fn discard(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            warn!(
                "Failed to remove temp file {}: {}",
                self.temp_path.display(),
                e
            );
        }
    }
}

/// Runs one upload stream to completion.
///
/// The first chunk fixes the filename; the filename on any later chunk is
/// ignored. Validation and file-I/O failures terminate the stream with a
/// structured `ok=false` reply; a transport receive error propagates as a
/// [`ServiceError`] instead. A stream that ends before any filename-bearing
/// chunk arrives is a failure, not a silent no-op.
pub async fn handle_upload(
    storage_root: &Path,
    mut chunks: mpsc::Receiver<Result<UploadChunk, StreamError>>,
) -> Result<UploadReply, ServiceError> {
    let mut open: Option<OpenUpload> = None;

    loop {
        match chunks.recv().await {
            // Clean end-of-stream from the client.
            None => {
                return match open {
                    Some(upload) => commit(upload).await,
                    None => {
                        warn!("Upload stream ended before a filename arrived");
                        Ok(UploadReply::failure("filename required"))
                    }
                };
            }

            // Transport-level receive failure: no structured reply possible.
            Some(Err(e)) => {
                error!("Upload stream receive failed: {}", e);
                if let Some(upload) = open.take() {
                    upload.discard().await;
                }
                return Err(e.into());
            }

            Some(Ok(chunk)) => {
                if open.is_none() {
                    let safe = sanitize(chunk.filename.as_deref().unwrap_or_default());
                    if safe.is_empty() {
                        warn!(
                            "Upload rejected: unusable filename {:?}",
                            chunk.filename.as_deref().unwrap_or_default()
                        );
                        return Ok(UploadReply::failure("filename required"));
                    }

                    let final_path = storage_root.join(&safe);

                    let (file, temp_path) = match create_temp(storage_root, &safe).await {
                        Ok(opened) => opened,
                        Err(e) => {
                            error!("Failed to create temp file for {}: {}", safe, e);
                            return Ok(UploadReply::failure(format!("cannot create file: {e}")));
                        }
                    };

                    info!("Upload started: {}", safe);
                    open = Some(OpenUpload {
                        file,
                        temp_path,
                        final_path,
                        filename: safe,
                        bytes_received: 0,
                    });
                }

                // The first chunk may carry data alongside the filename.
                if !chunk.data.is_empty() {
                    let upload = open.as_mut().unwrap();
                    if let Err(e) = upload.file.write_all(&chunk.data).await {
                        error!("Write failed for {}: {}", upload.filename, e);
                        open.take().unwrap().discard().await;
                        return Ok(UploadReply::failure(format!("write failed: {e}")));
                    }
                    upload.bytes_received += chunk.data.len() as u64;
                }
            }
        }
    }
}

/// Flushes the temp file and renames it over the final path
async fn commit(mut upload: OpenUpload) -> Result<UploadReply, ServiceError> {
    if let Err(e) = upload.file.flush().await {
        error!("Flush failed for {}: {}", upload.filename, e);
        upload.discard().await;
        return Ok(UploadReply::failure(format!("flush failed: {e}")));
    }
    drop(upload.file);

    match tokio::fs::rename(&upload.temp_path, &upload.final_path).await {
        Ok(()) => {
            info!(
                "Upload completed: {} ({} bytes)",
                upload.filename, upload.bytes_received
            );
            Ok(UploadReply::success("upload complete"))
        }
        Err(e) => {
            error!(
                "Failed to rename {} to {}: {}",
                upload.temp_path.display(),
                upload.final_path.display(),
                e
            );
            if let Err(e) = tokio::fs::remove_file(&upload.temp_path).await {
                warn!(
                    "Failed to remove temp file {}: {}",
                    upload.temp_path.display(),
                    e
                );
            }
            Ok(UploadReply::failure(format!("commit failed: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Counts leftover session temp files (dot-prefixed, `.tmp`-suffixed)
    fn temp_leftovers(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name();
                let name = name.to_string_lossy();
                name.starts_with('.') && name.ends_with(".tmp")
            })
            .count()
    }

    async fn run_upload(
        root: &Path,
        items: Vec<Result<UploadChunk, StreamError>>,
    ) -> Result<UploadReply, ServiceError> {
        let (tx, rx) = mpsc::channel(8);
        for item in items {
            tx.send(item).await.unwrap();
        }
        drop(tx);
        handle_upload(root, rx).await
    }

    #[tokio::test]
    async fn multi_chunk_upload_materializes_file() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("a.txt")),
                Ok(UploadChunk::data(b"hel".to_vec())),
                Ok(UploadChunk::data(b"lo".to_vec())),
            ],
        )
        .await
        .unwrap();

        assert!(reply.ok);
        assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(temp_leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn first_chunk_may_carry_filename_and_data() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(
            root.path(),
            vec![Ok(UploadChunk {
                filename: Some("one.bin".into()),
                data: b"payload".to_vec(),
            })],
        )
        .await
        .unwrap();

        assert!(reply.ok);
        assert_eq!(fs::read(root.path().join("one.bin")).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn empty_file_upload_is_valid() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(root.path(), vec![Ok(UploadChunk::named("empty"))])
            .await
            .unwrap();

        assert!(reply.ok);
        assert_eq!(fs::read(root.path().join("empty")).unwrap(), b"");
    }

    #[tokio::test]
    async fn reupload_fully_replaces_longer_content() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("f"), b"a much longer previous body").unwrap();

        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("f")),
                Ok(UploadChunk::data(b"tiny".to_vec())),
            ],
        )
        .await
        .unwrap();

        assert!(reply.ok);
        assert_eq!(fs::read(root.path().join("f")).unwrap(), b"tiny");
    }

    #[tokio::test]
    async fn traversal_filename_lands_inside_root() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("../../etc/passwd")),
                Ok(UploadChunk::data(b"x".to_vec())),
            ],
        )
        .await
        .unwrap();

        assert!(reply.ok);
        assert!(root.path().join("passwd").exists());
    }

    #[tokio::test]
    async fn empty_stream_is_an_explicit_failure() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(root.path(), vec![]).await.unwrap();

        assert!(!reply.ok);
        assert!(reply.message.contains("filename required"));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unusable_filename_creates_nothing() {
        let root = TempDir::new().unwrap();
        for bad in ["", "/", "..", "../.."] {
            let reply = run_upload(
                root.path(),
                vec![
                    Ok(UploadChunk::named(bad)),
                    Ok(UploadChunk::data(b"x".to_vec())),
                ],
            )
            .await
            .unwrap();
            assert!(!reply.ok, "filename: {bad:?}");
        }
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn later_filenames_are_ignored() {
        let root = TempDir::new().unwrap();
        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("first.txt")),
                Ok(UploadChunk {
                    filename: Some("second.txt".into()),
                    data: b"body".to_vec(),
                }),
            ],
        )
        .await
        .unwrap();

        assert!(reply.ok);
        assert!(root.path().join("first.txt").exists());
        assert!(!root.path().join("second.txt").exists());
    }

    #[tokio::test]
    async fn stream_error_discards_partial_upload() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("keep"), b"previous version").unwrap();

        let result = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("keep")),
                Ok(UploadChunk::data(b"half-written".to_vec())),
                Err(StreamError::Receive("connection reset".into())),
            ],
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Stream(_))));
        // Previous version intact, temp file gone.
        assert_eq!(fs::read(root.path().join("keep")).unwrap(), b"previous version");
        assert_eq!(temp_leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn tmp_suffixed_stored_file_survives_sibling_upload() {
        let root = TempDir::new().unwrap();

        // "a.tmp" is a perfectly valid stored-file name of its own.
        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("a.tmp")),
                Ok(UploadChunk::data(b"precious".to_vec())),
            ],
        )
        .await
        .unwrap();
        assert!(reply.ok);

        let reply = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("a")),
                Ok(UploadChunk::data(b"fresh".to_vec())),
            ],
        )
        .await
        .unwrap();
        assert!(reply.ok);

        assert_eq!(fs::read(root.path().join("a.tmp")).unwrap(), b"precious");
        assert_eq!(fs::read(root.path().join("a")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn failed_upload_leaves_tmp_suffixed_sibling_intact() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.tmp"), b"precious").unwrap();

        let result = run_upload(
            root.path(),
            vec![
                Ok(UploadChunk::named("a")),
                Ok(UploadChunk::data(b"half".to_vec())),
                Err(StreamError::Receive("connection reset".into())),
            ],
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Stream(_))));
        // The discard must only touch the session's own temp file.
        assert_eq!(fs::read(root.path().join("a.tmp")).unwrap(), b"precious");
        assert!(!root.path().join("a").exists());
        assert_eq!(temp_leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn concurrent_same_name_uploads_commit_one_complete_version() {
        let root = TempDir::new().unwrap();
        let alpha: Vec<u8> = b"alpha-".repeat(50);
        let beta: Vec<u8> = b"beta-".repeat(60);

        let (tx1, rx1) = mpsc::channel(16);
        let (tx2, rx2) = mpsc::channel(16);

        let path1 = root.path().to_path_buf();
        let h1 = tokio::spawn(async move { handle_upload(&path1, rx1).await });
        let path2 = root.path().to_path_buf();
        let h2 = tokio::spawn(async move { handle_upload(&path2, rx2).await });

        // Interleave the two sessions' records toward the same target.
        tx1.send(Ok(UploadChunk::named("same"))).await.unwrap();
        tx2.send(Ok(UploadChunk::named("same"))).await.unwrap();
        let paired = alpha.chunks(37).count().min(beta.chunks(41).count());
        for (a, b) in alpha.chunks(37).zip(beta.chunks(41)) {
            tx1.send(Ok(UploadChunk::data(a.to_vec()))).await.unwrap();
            tx2.send(Ok(UploadChunk::data(b.to_vec()))).await.unwrap();
        }
        for a in alpha.chunks(37).skip(paired) {
            tx1.send(Ok(UploadChunk::data(a.to_vec()))).await.unwrap();
        }
        for b in beta.chunks(41).skip(paired) {
            tx2.send(Ok(UploadChunk::data(b.to_vec()))).await.unwrap();
        }
        drop(tx1);
        drop(tx2);

        assert!(h1.await.unwrap().unwrap().ok);
        assert!(h2.await.unwrap().unwrap().ok);

        // The last rename wins, but the winner is one complete upload,
        // never interleaved bytes of both.
        let body = fs::read(root.path().join("same")).unwrap();
        assert!(body == alpha || body == beta, "commingled content: {body:?}");
        assert_eq!(temp_leftovers(root.path()), 0);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }
}
