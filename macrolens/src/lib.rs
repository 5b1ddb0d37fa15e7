//! # macrolens: food photo → nutrition estimate relay
//!
//! `macrolens` is a single-route HTTP relay in front of a multimodal inference
//! service. A client POSTs a photo of a dish to `/analyze`; the service spools
//! the upload to a temp file, base64-encodes it, sends it with a fixed
//! instruction prompt to the Gemini `generateContent` API, validates the
//! structured response, deletes the temp file, and returns the nutrition
//! estimate as JSON.
//!
//! ## Request Flow
//!
//! Each request is independent and strictly linear: receive multipart upload →
//! spool to disk → read bytes → encode → call inference service → parse result
//! → delete temp file → respond. There is no queuing, retrying, or caching,
//! and no state survives a request. The one operational invariant is that the
//! per-request temp file is removed on every exit path, so the upload
//! directory never accumulates files under sustained load.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); the outbound
//! call uses `reqwest` with a bounded timeout. Failures are converted to a
//! uniform JSON error envelope at the handler boundary ([`errors`]), requests
//! are traced with `tower-http`, and the API is documented with `utoipa`
//! (served at `/docs`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use macrolens::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = macrolens::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     macrolens::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module. The only required setting is the inference
//! credential (`GEMINI_API_KEY`); startup fails without it.

pub mod api;
pub mod config;
pub mod errors;
pub mod inference;
mod openapi;
pub mod telemetry;
mod uploads;

#[cfg(test)]
mod test;

use crate::api::handlers::analyze::analyze;
use crate::config::{CorsConfig, CorsOrigin};
use crate::inference::GeminiClient;
use crate::openapi::ApiDoc;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Json, Router,
    routing::{get, post},
};
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub inference: Arc<GeminiClient>,
}

/// Build the service router: the analysis route plus health and docs endpoints.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = build_cors_layer(&state.config.cors)?;

    // Leave headroom above the file limit for multipart framing; the precise
    // per-file limit is enforced while streaming the field
    let body_limit = state.config.uploads.max_file_size.saturating_add(1024 * 1024) as usize;

    let router = Router::new()
        .route("/analyze", post(analyze))
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state);

    Ok(router)
}

fn build_cors_layer(config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let mut cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        cors = cors.allow_origin(Any);
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| match origin {
                CorsOrigin::Url(url) => HeaderValue::from_str(url.as_str().trim_end_matches('/'))
                    .with_context(|| format!("invalid CORS origin: {url}")),
                CorsOrigin::Wildcard => unreachable!("wildcard handled above"),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        cors = cors.allow_origin(origins);
    }

    if let Some(max_age) = config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Main application struct that owns the router and server lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] validates configuration, prepares the
///    upload directory, and builds the inference client and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles
///    requests until the shutdown future resolves
#[derive(Debug)]
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized.
    ///
    /// Fails (rather than exiting the process) when the configuration is
    /// invalid, so startup errors are testable and reportable by the caller.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.uploads.dir)
            .await
            .with_context(|| format!("failed to create upload directory {}", config.uploads.dir.display()))?;

        let inference = Arc::new(GeminiClient::new(&config.inference)?);

        let state = AppState {
            config: config.clone(),
            inference,
        };
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "macrolens listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutdown complete");
        Ok(())
    }
}
