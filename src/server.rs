//! Module `server`
//!
//! Length-prefixed TCP framing that adapts client connections onto the
//! service's channel contract. Each connection carries exactly one
//! operation, selected by a leading tag byte. The transport performs no
//! storage logic of its own; cancellation reaches the service as stream
//! receive/send failures once the peer goes away.
//!
//! Wire shapes (all integers big-endian):
//! - request: `op` tag byte (1 upload, 2 download, 3 list)
//! - upload stream: marker byte per record (0 = chunk, 1 = end); a chunk is
//!   `has_filename` byte, optional `u16`-prefixed name, `u32`-prefixed data;
//!   reply is `ok` byte plus `u32`-prefixed message
//! - download/list reply: tagged frames (1 = data, 0 = end, 2 = error)

use std::future::pending;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::StreamError;
use crate::protocol::{UploadChunk, UploadReply};
use crate::service::FileService;

const OP_UPLOAD: u8 = 1;
const OP_DOWNLOAD: u8 = 2;
const OP_LIST: u8 = 3;

const MARKER_CHUNK: u8 = 0;
const MARKER_END: u8 = 1;

const FRAME_END: u8 = 0;
const FRAME_DATA: u8 = 1;
const FRAME_ERROR: u8 = 2;

/// Largest accepted payload for a single inbound data frame
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub struct Server {
    listener: TcpListener,
    service: Arc<FileService>,
}

impl Server {
    pub async fn bind(config: &ServerConfig, service: Arc<FileService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_socket()).await?;
        info!("Server bound to {}", config.listen_socket());
        Ok(Self { listener, service })
    }

    /// Address the listener actually bound to (useful with port 0)
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop: one spawned task per connection.
    pub async fn start(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            warn!("Connection {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    service: Arc<FileService>,
) -> Result<(), std::io::Error> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let op = reader.read_u8().await?;
    match op {
        OP_UPLOAD => handle_upload_connection(&mut reader, &mut writer, service).await?,
        OP_DOWNLOAD => handle_download_connection(&mut reader, &mut writer, service).await?,
        OP_LIST => handle_list_connection(&mut writer, service).await?,
        other => {
            warn!("Unknown operation tag {}", other);
            write_error(&mut writer, &format!("unknown operation: {other}")).await?;
        }
    }

    writer.flush().await
}

/// Feeds inbound upload records into the service and writes back its reply.
async fn handle_upload_connection(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut BufWriter<OwnedWriteHalf>,
    service: Arc<FileService>,
) -> Result<(), std::io::Error> {
    let (tx, rx) = mpsc::channel(16);

    let reply = {
        let feeder = feed_upload_records(reader, tx);
        let upload = service.upload(pending(), rx);
        let (_, reply) = tokio::join!(feeder, upload);
        reply
    };

    match reply {
        Ok(reply) => write_upload_reply(writer, &reply).await,
        Err(e) => {
            // Transport-level failure: report it in-band and drop the link.
            write_upload_reply(writer, &UploadReply::failure(e.to_string())).await?;
            writer.flush().await?;
            Err(std::io::Error::other(e.to_string()))
        }
    }
}

/// Decodes upload records off the socket until the end marker, a framing
/// violation, or the service hanging up.
async fn feed_upload_records(
    reader: &mut BufReader<OwnedReadHalf>,
    tx: mpsc::Sender<Result<UploadChunk, StreamError>>,
) {
    loop {
        let record = read_upload_record(reader).await;
        match record {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    // Service already terminated the stream.
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = tx
                    .send(Err(StreamError::Receive(e.to_string())))
                    .await;
                return;
            }
        }
    }
}

/// Reads one upload record; `None` means the client sent the end marker.
async fn read_upload_record(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<Option<UploadChunk>, std::io::Error> {
    match reader.read_u8().await? {
        MARKER_END => Ok(None),
        MARKER_CHUNK => {
            let filename = if reader.read_u8().await? != 0 {
                Some(read_name(reader).await?)
            } else {
                None
            };

            let len = reader.read_u32().await?;
            if len > MAX_FRAME_BYTES {
                return Err(std::io::Error::other(format!("frame too large: {len}")));
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data).await?;

            Ok(Some(UploadChunk { filename, data }))
        }
        other => Err(std::io::Error::other(format!(
            "invalid record marker: {other}"
        ))),
    }
}

async fn handle_download_connection(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut BufWriter<OwnedWriteHalf>,
    service: Arc<FileService>,
) -> Result<(), std::io::Error> {
    let filename = read_name(reader).await?;

    let (tx, mut rx) = mpsc::channel(16);
    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.download(pending(), &filename, tx).await })
    };

    while let Some(chunk) = rx.recv().await {
        writer.write_u8(FRAME_DATA).await?;
        writer.write_u32(chunk.data.len() as u32).await?;
        writer.write_all(&chunk.data).await?;
    }

    match task.await {
        Ok(Ok(())) => writer.write_u8(FRAME_END).await,
        Ok(Err(e)) => write_error(writer, &e.to_string()).await,
        Err(e) => write_error(writer, &format!("download task failed: {e}")).await,
    }
}

async fn handle_list_connection(
    writer: &mut BufWriter<OwnedWriteHalf>,
    service: Arc<FileService>,
) -> Result<(), std::io::Error> {
    match service.list_files(pending()).await {
        Ok(entries) => {
            writer.write_u8(FRAME_DATA).await?;
            writer.write_u32(entries.len() as u32).await?;
            for entry in &entries {
                write_string(writer, &entry.filename).await?;
                write_string(writer, &entry.created_at).await?;
                write_string(writer, &entry.modified_at).await?;
                writer.write_u64(entry.size_bytes).await?;
            }
            writer.write_u8(FRAME_END).await
        }
        Err(e) => write_error(writer, &e.to_string()).await,
    }
}

async fn read_name(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, std::io::Error> {
    let len = reader.read_u16().await?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| std::io::Error::other(format!("invalid utf-8 name: {e}")))
}

async fn write_string(
    writer: &mut BufWriter<OwnedWriteHalf>,
    value: &str,
) -> Result<(), std::io::Error> {
    writer.write_u16(value.len() as u16).await?;
    writer.write_all(value.as_bytes()).await
}

async fn write_upload_reply(
    writer: &mut BufWriter<OwnedWriteHalf>,
    reply: &UploadReply,
) -> Result<(), std::io::Error> {
    writer.write_u8(if reply.ok { 1 } else { 0 }).await?;
    writer.write_u32(reply.message.len() as u32).await?;
    writer.write_all(reply.message.as_bytes()).await
}

async fn write_error(
    writer: &mut BufWriter<OwnedWriteHalf>,
    message: &str,
) -> Result<(), std::io::Error> {
    writer.write_u8(FRAME_ERROR).await?;
    writer.write_u32(message.len() as u32).await?;
    writer.write_all(message.as_bytes()).await
}
