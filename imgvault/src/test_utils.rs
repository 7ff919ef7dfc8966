//! Test utilities for integration testing (available with the
//! `test-utils` feature).

use crate::config::{Config, StorageBackend, StorageConfig};
use axum_test::TestServer;

/// Config for tests: in-memory backend with placeholder credentials so the
/// upload policy's configuration checks pass.
pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            account_name: "testaccount".to_string(),
            account_key: "dGVzdGtleQ==".to_string(),
            connection_string: String::new(),
            image_container: "images".to_string(),
            thumbnail_container: String::new(),
            blob_endpoint: None,
        },
        ..Config::default()
    }
}

/// Build the application for the given config and wrap it in a test server.
pub fn create_test_app(config: Config) -> TestServer {
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}
