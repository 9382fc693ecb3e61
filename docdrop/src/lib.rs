//! # docdrop: file uploads with PDF text extraction
//!
//! `docdrop` is a small HTTP service over a flat upload directory. Clients upload files under
//! their own names, list and download them, and delete them one at a time or all at once. For
//! PDFs, the service can run OCR followed by text extraction, delegating both steps to Adobe PDF
//! Services and returning the zipped result.
//!
//! ## Architecture
//!
//! - [`storage`]: the upload directory, keyed by validated filename
//! - [`pdf_services`]: the external OCR/extraction backend behind the
//!   [`PdfServices`](pdf_services::PdfServices) trait, with an Adobe REST client and a local
//!   passthrough
//! - [`extraction`]: the OCR-then-extract pipeline and its output naming
//! - [`api`]: axum handlers and response models, documented in [`openapi`]
//! - [`config`], [`errors`], [`telemetry`]: ambient configuration, error mapping and tracing
//!
//! ## Lifecycle
//!
//! 1. **Create**: [`Application::new`] prepares the upload directory (optionally clearing it
//!    first) and builds the configured PDF services backend
//! 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
//!    shutdown future resolves

pub mod api;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod openapi;
pub mod pdf_services;
pub mod storage;
pub mod telemetry;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{self, HeaderName, HeaderValue};
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::extraction::ExtractionPipeline;
use crate::openapi::ApiDoc;
use crate::storage::LocalFileStorage;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .storage(storage)
///     .extraction(Arc::new(pipeline))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: LocalFileStorage,
    pub extraction: Arc<ExtractionPipeline>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash `Url` adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let exposed_headers = config
        .cors
        .exposed_headers
        .iter()
        .map(|name| name.parse::<HeaderName>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::DELETE])
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(exposed_headers);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/healthz`: liveness check
/// - `/files`, `/files/{filename}`, `/files/{filename}/extract`: the file API
/// - `/api-docs/openapi.json` and `/docs`: API documentation
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    // Upload route gets its own body limit; the handler enforces the exact file size
    let upload_limit = state.config.storage.max_file_size.saturating_add(MULTIPART_OVERHEAD);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route(
            "/files",
            post(api::handlers::files::upload_file)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(api::handlers::files::list_files)
                .delete(api::handlers::files::delete_all_files),
        )
        .route(
            "/files/{filename}",
            get(api::handlers::files::get_file).delete(api::handlers::files::delete_file),
        )
        .route("/files/{filename}/extract", post(api::handlers::extraction::extract_file))
        .with_state(state);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .merge(api_routes)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Prepare the upload directory, clearing it first when configured to
async fn setup_storage(config: &Config) -> anyhow::Result<LocalFileStorage> {
    let storage = LocalFileStorage::new(&config.storage.root);

    if config.storage.clear_on_startup {
        let removed = storage
            .delete_all()
            .await
            .with_context(|| format!("Failed to clear upload directory {}", storage.root().display()))?;
        info!(removed, root = %storage.root().display(), "Cleared upload directory on startup");
    }

    storage.init().await.context("Could not initialize folder for upload!")?;
    Ok(storage)
}

/// The HTTP service and everything it needs to run.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting docdrop with configuration: {:#?}", config);

        let storage = setup_storage(&config).await?;

        let services = pdf_services::create_processor(&config.pdf_services).context("Failed to create PDF services backend")?;
        let extraction = Arc::new(ExtractionPipeline::new(&config.storage.output_dir, services));

        let app_state = AppState::builder()
            .config(config.clone())
            .storage(storage)
            .extraction(extraction)
            .build();

        let router = build_router(app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
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
            "docdrop listening on http://{}, available at http://localhost:{}",
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
