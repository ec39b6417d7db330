//! File system storage management
//!
//! Filename sanitization and storage-root enumeration.

pub mod operations;
pub mod sanitize;

pub use operations::list_entries;
pub use sanitize::sanitize;
