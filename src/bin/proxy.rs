#![forbid(unsafe_code)]

//! Axum proxy in front of the third-party video resolver.
//!
//! `/api/download` forwards the submitted URL upstream once and hands back the
//! upstream JSON as-is. Nothing is cached or persisted between requests; every
//! handler works only with the immutable resolver stored in [`AppState`].

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde_json::{Value, json, value::RawValue};
use tokio::signal;
use url::Url;
use vidgrab_tools::{
    config::{ProxyOverrides, resolve_proxy_settings},
    controller::GENERIC_FAILURE,
    logging::init_logging,
    upstream::{HttpResolver, Resolver},
};

const URL_REQUIRED: &str = "URL is required";

#[derive(Debug, Parser)]
#[command(name = "proxy", about = "Serve /api/download in front of the video resolver")]
struct ProxyArgs {
    /// Listen port (defaults to PORT or 5000).
    #[arg(long)]
    port: Option<u16>,
    /// Listen address (defaults to HOST or 127.0.0.1).
    #[arg(long)]
    host: Option<String>,
    /// Base URL of the upstream resolver (defaults to UPSTREAM_BASE_URL).
    #[arg(long)]
    upstream: Option<String>,
    /// Alternate `.env` file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl ProxyArgs {
    fn into_overrides(self) -> ProxyOverrides {
        ProxyOverrides {
            port: self.port,
            host: self.host,
            upstream_base_url: self.upstream,
            env_path: self.env_file,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/HOST")
}

/// Shared state injected into every handler. Read-only after startup.
#[derive(Clone)]
struct AppState {
    resolver: Arc<dyn Resolver>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Creates a 400 error with the provided message.
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Creates a 404 error with the provided message.
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Creates a 500 error with the provided message.
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let settings = resolve_proxy_settings(ProxyArgs::parse().into_overrides())?;
    let host = parse_host_arg(&settings.host)?;
    let upstream = Url::parse(&settings.upstream_base_url)
        .with_context(|| format!("parsing upstream URL {}", settings.upstream_base_url))?;

    let state = AppState {
        resolver: Arc::new(HttpResolver::new(upstream)),
    };
    let app = router(state);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    log::info!("Server running on http://{}", addr);
    log::info!("Forwarding lookups to {}", settings.upstream_base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running proxy server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", get(download))
        .route("/api/health", get(health))
        .fallback(api_fallback)
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        log::error!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn api_fallback(req: Request<Body>) -> ApiError {
    log::debug!("no route for {}", req.uri().path());
    ApiError::not_found("endpoint not found")
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

/// Forwards `url` upstream and relays the payload text unchanged. Upstream
/// faults collapse into one generic 500; the concrete kind only reaches the
/// log.
async fn download(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Json<Box<RawValue>>> {
    let pairs = match query {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            log::debug!("unreadable query string: {rejection}");
            Vec::new()
        }
    };
    let url = first_url(pairs).ok_or_else(|| {
        log::debug!("rejecting lookup without url");
        ApiError::bad_request(URL_REQUIRED)
    })?;

    // The resolver blocks on network I/O.
    let resolver = state.resolver.clone();
    let outcome = tokio::task::spawn_blocking(move || resolver.resolve(&url)).await;

    match outcome {
        Ok(Ok(payload)) => Ok(Json(payload)),
        Ok(Err(fault)) => {
            log::error!("Error fetching video information: {fault}");
            Err(ApiError::internal(GENERIC_FAILURE))
        }
        Err(err) => {
            log::error!("Resolver task failed: {err}");
            Err(ApiError::internal(GENERIC_FAILURE))
        }
    }
}

/// Repeated `url` keys are allowed; the first one wins.
fn first_url(pairs: Vec<(String, String)>) -> Option<String> {
    pairs
        .into_iter()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value)
        .filter(|url| !url.trim().is_empty())
}
