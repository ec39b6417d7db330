//! Filedock - Entry Point
//!
//! A chunked file-transfer server: clients push files over a streaming
//! upload, pull them back in bounded chunks, and enumerate what is stored.

use std::sync::Arc;

use log::{error, info};

use filedock::config::ServerConfig;
use filedock::server::Server;
use filedock::FileService;

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let service = match FileService::new(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(
                "Failed to prepare storage root {}: {}",
                config.storage_root, e
            );
            std::process::exit(1);
        }
    };

    info!(
        "Launching filedock on {} (storage root: {}, {} transfer / {} list slots)",
        config.listen_socket(),
        config.storage_root,
        config.transfer_slots,
        config.list_slots
    );

    let server = match Server::bind(&config, service).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen_socket(), e);
            std::process::exit(1);
        }
    };

    server.start().await;
}
