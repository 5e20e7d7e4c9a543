//! HTTP shell around the audit engine.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod upload;

use crate::adapters::{LocalStorage, OpenAiClient};
use crate::config::toml_config::{AuditConfig, ServerConfig};
use crate::core::audit::AuditEngine;
use crate::domain::ports::CompletionClient;
use crate::server::error::ApiError;
use crate::server::rate_limit::RateLimiter;
use crate::server::upload::UploadPolicy;
use crate::utils::error::Result;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

const RATE_LIMITED_PATH: &str = "/audit";

pub struct AppState {
    pub config: AuditConfig,
    pub engine: AuditEngine<LocalStorage>,
    pub upload_policy: UploadPolicy,
    pub rate_limiter: RateLimiter,
    pub monitor_enabled: bool,
}

impl AppState {
    pub fn new(
        config: AuditConfig,
        client: Arc<dyn CompletionClient>,
        monitor_enabled: bool,
    ) -> Result<Self> {
        let storage = LocalStorage::new(&config.server.output_dir);
        let engine = AuditEngine::new(&config, client, storage)?;
        Ok(Self {
            upload_policy: UploadPolicy::from_config(&config.upload),
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window_seconds,
            ),
            engine,
            config,
            monitor_enabled,
        })
    }

    /// 使用設定中的 OpenAI 相容端點
    pub fn from_config(config: AuditConfig, monitor_enabled: bool) -> Result<Self> {
        let client = Arc::new(OpenAiClient::new(&config.llm)?);
        Self::new(config, client, monitor_enabled)
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = (state.config.max_total_bytes() + 1024 * 1024) as usize;

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/industries", get(handlers::industries))
        .route(
            "/audit",
            post(handlers::audit).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/download-report", get(handlers::download_report))
        .route("/download-report/", get(handlers::download_report))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), trusted_host))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate"),
        ))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let server = &state.config.server;
    tokio::fs::create_dir_all(&server.upload_dir).await?;
    tokio::fs::create_dir_all(&server.output_dir).await?;

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Audit engine listening on http://{}", addr);
    tracing::info!(
        "🔒 Upload limits: {} files, {}MB per file, {}MB total; rate limit {} per {}s",
        state.config.upload.max_files,
        state.config.upload.max_file_size_mb,
        state.config.upload.max_total_size_mb,
        state.config.rate_limit.max_requests,
        state.config.rate_limit.window_seconds
    );

    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// 連線 IP → X-Forwarded-For 第一個位址 → "unknown"
pub fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|first| first.trim().to_string())
        .filter(|first| !first.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if request.uri().path() == RATE_LIMITED_PATH {
        let key = client_key(&request);
        if !state.rate_limiter.allow(&key, Instant::now()) {
            let retry_after = state.rate_limiter.retry_after_seconds();
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(json!({
                    "error": "Rate limit exceeded. Please wait before trying again.",
                    "retry_after_seconds": retry_after,
                })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn trusted_host(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let trusted = &state.config.server.trusted_hosts;
    if !trusted.is_empty() {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !host_allowed(host, trusted) {
            tracing::warn!("🚫 Rejected request for untrusted host {:?}", host);
            return ApiError::bad_request("Invalid host header").into_response();
        }
    }
    next.run(request).await
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// 完全相符，或 `*.example.com` 形式的子網域比對；空清單全部允許
pub fn host_allowed(host: &str, trusted: &[String]) -> bool {
    if trusted.is_empty() {
        return true;
    }
    let host = strip_port(host.trim()).to_lowercase();
    if host.is_empty() {
        return false;
    }
    trusted.iter().any(|pattern| {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            _ if pattern == "*" => true,
            Some(suffix) => host.ends_with(&format!(".{}", suffix)),
            None => pattern == host,
        }
    })
}

/// 支援 `https://*.vercel.app` 這類萬用字元來源
pub fn origin_allowed(origin: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.split_once("*.") {
        Some((scheme, suffix)) => {
            origin.starts_with(scheme) && origin.ends_with(&format!(".{}", suffix))
        }
        None => pattern == origin,
    })
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let patterns = server.cors_origins.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| origin_allowed(origin, &patterns))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(600))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_host_allowed() {
        let trusted = list(&["localhost", "127.0.0.1", "*.onrender.com"]);
        assert!(host_allowed("localhost:8000", &trusted));
        assert!(host_allowed("127.0.0.1", &trusted));
        assert!(host_allowed("audit.onrender.com", &trusted));
        assert!(!host_allowed("onrender.com.evil.net", &trusted));
        assert!(!host_allowed("", &trusted));
        assert!(host_allowed("anything.example", &[]));
    }

    #[test]
    fn test_origin_allowed() {
        let origins = list(&["http://localhost:3000", "https://*.vercel.app"]);
        assert!(origin_allowed("http://localhost:3000", &origins));
        assert!(origin_allowed("https://audit-git-main.vercel.app", &origins));
        assert!(!origin_allowed("http://audit.vercel.app", &origins));
        assert!(!origin_allowed("https://vercel.app.evil.com", &origins));
    }

    #[test]
    fn test_client_key_prefers_forwarded_header_without_connect_info() {
        let request = Request::builder()
            .uri("/audit")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");

        let bare = Request::builder()
            .uri("/audit")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&bare), "unknown");
    }
}
