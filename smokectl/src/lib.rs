//! # smokectl: HTTP smoke tests on demand
//!
//! `smokectl` runs smoke tests against a live website. A caller submits a base URL and a list
//! of paths; every path is probed under a per-request timeout, checked against the caller's
//! expectations, and reported back with its status, latency, size and failure reasons. Two
//! auxiliary checks are always appended: `/sitemap.xml` must contain a `<urlset` root and
//! `/manifest.json` must be reachable.
//!
//! ## Architecture
//!
//! The service is an [Axum](https://github.com/tokio-rs/axum) application with a single run
//! endpoint. A run is handled by [`probes::SmokeRunner`], which:
//!
//! 1. validates the input and reduces the base URL to its origin,
//! 2. fans the probes out with at most `smoke.concurrency` in flight ([`probes::scheduler`]),
//!    keeping results in input order,
//! 3. runs each response through the validator pipeline ([`probes::validators`]),
//! 4. appends the sitemap and manifest checks,
//! 5. sends a failure summary to the configured [`notifications::Notifier`] when anything
//!    failed. Delivery is fire-and-forget and never affects the response.
//!
//! Probe failures (timeouts, connection errors, non-2xx statuses, failed checks) are data, not
//! errors: they are recorded on each result. Only invalid input or an internal fault fails a
//! run.
//!
//! ## Configuration
//!
//! Configuration is loaded from a YAML file (default `config.yaml`) and `SMOKECTL_`-prefixed
//! environment variables; see [`config`]. `SLACK_WEBHOOK_URL` enables failure notifications.
//!
//! ## Endpoints
//!
//! - `POST /api/smoke`: run a smoke test
//! - `GET /healthz`: liveness
//! - `GET /api/openapi.json`: OpenAPI document
//! - `GET /internal/metrics`: Prometheus metrics, when `enable_metrics` is set

pub mod api;
pub mod config;
pub mod errors;
pub mod notifications;
mod openapi;
pub mod probes;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

pub use config::Config;
use config::CorsOrigin;
use notifications::WebhookNotifier;
use openapi::ApiDoc;
use probes::SmokeRunner;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .runner(Arc::new(runner))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub runner: Arc<SmokeRunner>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;

    // tower-http rejects `*` inside an explicit origin list
    let allow_origin = if origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/smoke", post(api::handlers::smoke::run_smoke))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The HTTP service: router plus configuration.
///
/// 1. **Create**: [`Application::new`] wires the notifier, the runner and the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting smokectl with configuration: {:#?}", config);

        let notifier = WebhookNotifier::new(&config.notifications)?;
        if notifier.is_enabled() {
            info!("Failure notifications enabled");
        } else {
            info!("No webhook configured, failure notifications disabled");
        }

        let runner = SmokeRunner::new(config.smoke.clone(), Arc::new(notifier))?;
        let state = AppState::builder().config(config.clone()).runner(Arc::new(runner)).build();
        let router = build_router(&state)?;

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
            "smokectl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("smokectl stopped");
        Ok(())
    }
}
