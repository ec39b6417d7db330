//! Error types
//!
//! Defines domain-specific error types for each module of the file service.

use std::fmt;
use std::io;

/// Admission controller errors
#[derive(Debug)]
pub enum AdmissionError {
    /// The caller's cancellation fired before a slot became available
    Cancelled,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Cancelled => write!(f, "Admission wait cancelled by caller"),
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Storage module errors
#[derive(Debug)]
pub enum StorageError {
    InvalidFilename(String),
    NotFound(String),
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidFilename(n) => write!(f, "Invalid filename: {:?}", n),
            StorageError::NotFound(n) => write!(f, "File not found: {}", n),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        StorageError::Io(error)
    }
}

/// Transport-level stream errors, produced by the channel adapter
#[derive(Debug)]
pub enum StreamError {
    /// Receiving the next inbound record failed
    Receive(String),
    /// Sending an outbound record failed (client went away)
    Send(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Receive(msg) => write!(f, "Stream receive failed: {}", msg),
            StreamError::Send(msg) => write!(f, "Stream send failed: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

/// General service error that encompasses all error types
#[derive(Debug)]
pub enum ServiceError {
    Cancelled,
    InvalidFilename(String),
    NotFound(String),
    Io(io::Error),
    Stream(StreamError),
}

impl ServiceError {
    /// True for errors caused by a missing stored file
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Cancelled => write!(f, "Operation cancelled"),
            ServiceError::InvalidFilename(n) => write!(f, "Invalid filename: {:?}", n),
            ServiceError::NotFound(n) => write!(f, "File not found: {}", n),
            ServiceError::Io(e) => write!(f, "I/O error: {}", e),
            ServiceError::Stream(e) => write!(f, "Stream error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<AdmissionError> for ServiceError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::Cancelled => ServiceError::Cancelled,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidFilename(n) => ServiceError::InvalidFilename(n),
            StorageError::NotFound(n) => ServiceError::NotFound(n),
            StorageError::Io(e) => ServiceError::Io(e),
        }
    }
}

impl From<StreamError> for ServiceError {
    fn from(error: StreamError) -> Self {
        ServiceError::Stream(error)
    }
}

impl From<io::Error> for ServiceError {
    fn from(error: io::Error) -> Self {
        ServiceError::Io(error)
    }
}
