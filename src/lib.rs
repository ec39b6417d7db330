pub mod admission;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod storage;

pub use service::FileService;
