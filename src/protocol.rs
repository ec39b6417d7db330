//! Module `protocol`
//!
//! Record types exchanged between the transport layer and the service
//! handlers. The transport owns framing and socket I/O; handlers only ever
//! see these shapes, delivered over tokio channels.

/// One inbound record of a client-to-server upload stream.
///
/// The first record of a stream is expected to carry the filename; the
/// filename on any later record is ignored. `data` may be empty on any
/// record.
#[derive(Debug, Clone, Default)]
pub struct UploadChunk {
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl UploadChunk {
    /// Record carrying only the target filename
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            data: Vec::new(),
        }
    }

    /// Record carrying only file data
    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: None,
            data: data.into(),
        }
    }
}

/// Terminal response for an upload stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReply {
    pub ok: bool,
    pub message: String,
}

impl UploadReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// One outbound record of a server-to-client download stream
#[derive(Debug, Clone)]
pub struct FileChunk {
    pub data: Vec<u8>,
}

/// One stored file as reported by the listing operation.
///
/// Both timestamps are RFC3339 strings sourced from the filesystem's
/// last-modification time; the platform's creation time is not consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub filename: String,
    pub created_at: String,
    pub modified_at: String,
    pub size_bytes: u64,
}
