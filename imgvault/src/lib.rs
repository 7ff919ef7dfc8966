//! # imgvault: HTTP facade for an image blob-storage account
//!
//! `imgvault` exposes a small HTTP API over a cloud blob-storage
//! container: clients upload image files, enumerate what is stored
//! (content inlined), fetch a single blob, or delete one. Every endpoint
//! is a thin forwarding layer over the storage backend; the one piece of
//! real policy is upload handling, which validates configuration and
//! content before anything is stored (see [`upload`]).
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum).
//! Handlers in [`api::handlers::blobs`] receive a shared [`AppState`]
//! holding the immutable [`Config`] and a [`storage::BlobStorage`] handle.
//! Two backends exist: Azure Blob Storage over the Blob REST API with
//! Shared Key auth ([`storage::AzureBlobStorage`]), and a process-local
//! map for development and tests ([`storage::InMemoryBlobStorage`]).
//!
//! Requests are independent of each other: no shared mutable state beyond
//! the storage handle, no cross-request coordination, and no atomicity
//! across the files of one upload batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use imgvault::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = imgvault::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     imgvault::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for the YAML/environment configuration layout.

pub mod api;
pub mod config;
pub mod errors;
pub mod media;
pub mod storage;
pub mod telemetry;
pub mod upload;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::config::{CorsOrigin, StorageBackend};
use crate::storage::{AzureBlobStorage, BlobStorage, InMemoryBlobStorage};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Router, http,
    routing::{get, post, put},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    /// Blob storage backend serving all four endpoints
    pub storage: Arc<dyn BlobStorage>,
    /// Application configuration loaded from file/environment
    pub config: Config,
}

/// Instantiate the storage backend selected in the configuration.
fn build_storage(config: &Config) -> anyhow::Result<Arc<dyn BlobStorage>> {
    match config.storage.backend {
        StorageBackend::Azure => Ok(Arc::new(AzureBlobStorage::new(&config.storage)?)),
        StorageBackend::Memory => {
            info!("Using in-memory storage backend; blobs will be lost on shutdown");
            Ok(Arc::new(InMemoryBlobStorage::new(config.storage.image_container.clone())))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// The upload route carries its own body limit from `upload.max_body_size`;
/// the remaining routes use the axum default.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload_body_limit = state.config.upload.max_body_size as usize;

    let blob_routes = Router::new()
        .route(
            "/Blob/Upload",
            post(api::handlers::blobs::upload).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/Blob/ListAll", post(api::handlers::blobs::list_all))
        .route("/Blob/DeleteFromAzure", put(api::handlers::blobs::delete_blob))
        .route("/Blob/GetBlob", post(api::handlers::blobs::get_blob));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(blob_routes)
        .with_state(state)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct owning the router and configuration.
///
/// 1. **Create**: [`Application::new`] builds the storage backend and router
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting imgvault with configuration: {:#?}", config);

        let storage = build_storage(&config)?;
        let state = AppState::builder().storage(storage).config(config.clone()).build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert the application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "imgvault listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::api::models::blobs::ImageResponse;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};

    /// Full pass through the HTTP surface: upload, enumerate, fetch the
    /// stored bytes back, delete, and observe the container empty again.
    #[test_log::test(tokio::test)]
    async fn upload_list_fetch_delete_cycle() {
        let png: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01];
        let mut config = create_test_config();
        config.storage.thumbnail_container = "thumbnails".to_string();
        let server = create_test_app(config);

        let form = MultipartForm::new().add_part(
            "files",
            Part::bytes(png).file_name("picture.png").mime_type("image/png"),
        );
        server.post("/Blob/Upload").multipart(form).await.assert_status(StatusCode::OK);

        let images: Vec<ImageResponse> = server.post("/Blob/ListAll").await.json();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].bytes, png);
        let name = images[0].name.clone();
        assert!(name.ends_with(".png"));

        let fetched = server.post("/Blob/GetBlob").add_query_param("blobName", &name).await;
        fetched.assert_status(StatusCode::OK);
        assert_eq!(fetched.as_bytes().as_ref(), png);

        server
            .put("/Blob/DeleteFromAzure")
            .add_query_param("blobName", &name)
            .await
            .assert_status(StatusCode::OK);

        let images: Vec<ImageResponse> = server.post("/Blob/ListAll").await.json();
        assert!(images.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn healthz_responds() {
        let server = create_test_app(create_test_config());
        let response = server.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.text(), "OK");
    }
}
