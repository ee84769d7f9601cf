//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all views
//! - Wire up middleware (request ID, tracing, timeout, body limits, metrics)
//! - Serve on a bound listener until shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::datasets::ConfigSet;
use crate::engine::ArchiveEngine;
use crate::http::request::{request_id, RequestUuid};
use crate::http::views;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Application state injected into handlers. Read-only after startup.
#[derive(Clone)]
pub struct ServerState {
    /// Datasets as configured on this server.
    pub cfg: Arc<ConfigSet>,
    /// Datasets as seen by clients, pointing back at this server.
    pub remote_cfg: Arc<ConfigSet>,
    /// Public base URL, without trailing slash.
    pub url: Arc<str>,
    pub engine: Arc<dyn ArchiveEngine>,
    /// Parent directory of staging areas.
    pub staging_root: Option<PathBuf>,
}

impl ServerState {
    pub fn new(cfg: ConfigSet, url: &str, engine: Arc<dyn ArchiveEngine>) -> Self {
        let url = url.trim_end_matches('/');
        let remote_cfg = remote_config(&cfg, url);
        Self {
            cfg: Arc::new(cfg),
            remote_cfg: Arc::new(remote_cfg),
            url: Arc::from(url),
            engine,
            staging_root: None,
        }
    }

    pub fn with_staging_root(mut self, root: Option<PathBuf>) -> Self {
        self.staging_root = root;
        self
    }
}

/// The configuration clients merge: every dataset becomes a remote
/// dataset served by `url`.
pub fn remote_config(cfg: &ConfigSet, url: &str) -> ConfigSet {
    let mut remote = cfg.clone();
    for (name, section) in remote.iter_mut() {
        section.set("name", name);
        section.set("type", "remote");
        section.set("path", format!("{}/dataset/{}", url, name));
        section.set("server", url);
    }
    remote
}

/// HTTP server for the dataset archive.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, state: ServerState) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: ServerState) -> Router {
        let max_body = config.security.max_body_size;

        Router::new()
            .route("/", get(views::index))
            .route("/config", get(views::config))
            .route("/qexpand", get(views::qexpand).post(views::qexpand))
            .route("/aliases", get(views::aliases))
            .route("/summary", get(views::macro_summary).post(views::macro_summary))
            .route("/query", get(views::macro_query).post(views::macro_query))
            .route("/dataset/{name}", get(views::dataset_index))
            .route("/dataset/{name}/config", get(views::dataset_config))
            .route(
                "/dataset/{name}/summary",
                get(views::dataset_summary).post(views::dataset_summary),
            )
            .route(
                "/dataset/{name}/summaryshort",
                get(views::dataset_summary_short).post(views::dataset_summary_short),
            )
            .route(
                "/dataset/{name}/query",
                get(views::dataset_query).post(views::dataset_query),
            )
            .route_layer(middleware::from_fn(track_metrics))
            .fallback(views::not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %request_id(req),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(RequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut rx = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Record request count and time to response headers per route.
async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let view = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    metrics::record_request(&view, response.status().as_u16(), start);
    response
}
