//! File transfer service
//!
//! The service façade owns the storage root and the admission controller.
//! Every operation acquires a slot for its class before touching the
//! stream or the filesystem, and holds it until the stream terminates.

pub mod download;
pub mod list;
pub mod upload;

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::admission::{AdmissionController, OpClass};
use crate::config::ServerConfig;
use crate::error::{ServiceError, StreamError};
use crate::protocol::{FileChunk, FileEntry, UploadChunk, UploadReply};

/// The server-side transfer engine behind the three operations.
///
/// Cheap to share: construct once and wrap in an `Arc` for the transport
/// layer to clone per connection.
#[derive(Debug)]
pub struct FileService {
    storage_root: PathBuf,
    chunk_size: usize,
    admission: AdmissionController,
}

impl FileService {
    /// Builds the service and makes sure the storage root exists.
    pub fn new(config: &ServerConfig) -> std::io::Result<Self> {
        let storage_root = PathBuf::from(&config.storage_root);
        std::fs::create_dir_all(&storage_root)?;

        Ok(Self {
            storage_root,
            chunk_size: config.chunk_size,
            admission: AdmissionController::new(config.transfer_slots, config.list_slots),
        })
    }

    pub fn storage_root(&self) -> &PathBuf {
        &self.storage_root
    }

    /// Runs one client-to-server upload stream.
    ///
    /// `cancelled` is the caller's cancellation signal (client disconnect,
    /// deadline); it is observed while waiting for an admission slot. Once
    /// the slot is held, the stream stops through its own receive errors.
    pub async fn upload(
        &self,
        cancelled: impl Future<Output = ()>,
        chunks: mpsc::Receiver<Result<UploadChunk, StreamError>>,
    ) -> Result<UploadReply, ServiceError> {
        let _slot = self.admission.acquire(OpClass::Transfer, cancelled).await?;
        upload::handle_upload(&self.storage_root, chunks).await
    }

    /// Streams a stored file to the client in bounded chunks.
    pub async fn download(
        &self,
        cancelled: impl Future<Output = ()>,
        filename: &str,
        chunks: mpsc::Sender<FileChunk>,
    ) -> Result<(), ServiceError> {
        let _slot = self.admission.acquire(OpClass::Transfer, cancelled).await?;
        download::handle_download(&self.storage_root, self.chunk_size, filename, chunks).await
    }

    /// Enumerates stored files with metadata.
    pub async fn list_files(
        &self,
        cancelled: impl Future<Output = ()>,
    ) -> Result<Vec<FileEntry>, ServiceError> {
        let _slot = self.admission.acquire(OpClass::List, cancelled).await?;
        list::handle_list(&self.storage_root).await
    }
}
