//! Error handling
//!
//! Domain-specific error types and conversions.

mod types;

pub use types::{AdmissionError, ServiceError, StorageError, StreamError};
