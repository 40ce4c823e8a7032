use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use fasticon::{
    normalize_target, Cli, HttpFetcher, IconResolver, Resolution, ResolveError, TargetError,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "fasticon=info,icon_api=info";
const CACHE_CONTROL: &str = "public, max-age=86400";
const ICON_SOURCE_HEADER: &str = "x-icon-source";

#[derive(Clone)]
struct AppState {
    resolver: Arc<IconResolver<HttpFetcher>>,
}

#[derive(Debug, Deserialize)]
struct TargetQuery {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let controls = cli.build_controls()?;
    let fetcher = HttpFetcher::new(&controls).context("failed to build http client")?;
    let state = AppState {
        resolver: Arc::new(IconResolver::new(fetcher, controls)),
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(query_handler))
        .route("/{*target}", get(path_handler))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "icon_api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn query_handler(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw = query.url.or(query.domain).unwrap_or_default();
    serve_icon(&state, &raw, &headers).await
}

async fn path_handler(
    State(state): State<AppState>,
    Path(target): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // A full URL captured in the path keeps its own query string.
    let raw = match raw_query {
        Some(query) if target.contains("://") || target.contains(":/") => format!("{target}?{query}"),
        _ => target,
    };
    serve_icon(&state, &raw, &headers).await
}

async fn serve_icon(state: &AppState, raw: &str, headers: &HeaderMap) -> Result<Response, ApiError> {
    let target = normalize_target(raw).map_err(target_error)?;
    let resolution = state.resolver.resolve(&target).await.map_err(resolve_error)?;
    Ok(icon_response(resolution, headers))
}

fn icon_response(resolution: Resolution, headers: &HeaderMap) -> Response {
    let etag = format!("\"{:08x}\"", crc32fast::hash(&resolution.icon.bytes));
    let source = resolution
        .source
        .as_ref()
        .map(|url| url.to_string())
        .unwrap_or_else(|| resolution.origin.to_string());

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag));
    let response_headers = [
        (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
        (header::ETAG, etag),
        (HeaderName::from_static(ICON_SOURCE_HEADER), source),
    ];
    if not_modified {
        return (StatusCode::NOT_MODIFIED, response_headers).into_response();
    }
    (
        StatusCode::OK,
        response_headers,
        [(header::CONTENT_TYPE, resolution.icon.content_type)],
        resolution.icon.bytes,
    )
        .into_response()
}

fn target_error(err: TargetError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn resolve_error(err: ResolveError) -> ApiError {
    let status = match &err {
        ResolveError::NotFound { .. } => StatusCode::NOT_FOUND,
        ResolveError::Upstream { .. } => {
            error!(%err, "lookup services unreachable");
            StatusCode::BAD_GATEWAY
        }
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}
