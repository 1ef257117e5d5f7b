use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::{atomic::Ordering, Arc}, time::Duration};
use thiserror::Error;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub mod config;
pub mod freshness;
pub mod metrics;
pub mod photo;
pub mod signature;
pub mod user;

use crate::config::{AppConfig, ConfigError};
use crate::freshness::check_freshness;
use crate::metrics::METRICS;
use crate::photo::{proxy_url, PhotoSource, ProfilePhotos, TelegramPhotoSource};
use crate::signature::{InitDataVerifier, SigningFields};
use crate::user::{parse_user, WebAppUser};

/// Bot API calls give up after this long.
const BOT_API_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Error, Debug)]
pub enum InitDataError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type Result<T> = std::result::Result<T, InitDataError>;

/// Shared, read-only request state. The verifier holds the derived secret
/// computed once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub verifier: InitDataVerifier,
    pub photos: ProfilePhotos,
}

impl AppState {
    /// State whose profile photos come from the configured Bot API.
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BOT_API_TIMEOUT)
            .build()
            .map_err(|e| InitDataError::HttpClient(e.to_string()))?;
        let source = TelegramPhotoSource::new(
            client,
            config.telegram_api_base.clone(),
            config.bot_token.clone(),
        );
        Self::with_photo_source(config, Arc::new(source))
    }

    pub fn with_photo_source(config: AppConfig, source: Arc<dyn PhotoSource>) -> Result<Self> {
        config.validate()?;
        let verifier = InitDataVerifier::new(&config.bot_token);
        let photos = ProfilePhotos::new(source, config.photo_cache_ttl);
        Ok(Self { config, verifier, photos })
    }
}

/// Body of `POST /verify_init`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, rename = "initData", alias = "init_data")]
    pub init_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub verified: bool,
    pub data: SigningFields,
    pub user: Option<WebAppUser>,
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub photo_url: Option<String>,
}

fn reject(status: StatusCode, reason: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { ok: false, error: reason.into() })).into_response()
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    let raw = match req.init_data.as_deref() {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            METRICS.payload_missing.fetch_add(1, Ordering::Relaxed);
            return reject(StatusCode::BAD_REQUEST, "initData missing");
        }
    };

    let fields = match state.verifier.verify(raw) {
        Ok(fields) => fields,
        Err(rejection) => {
            tracing::warn!("Init data verification failed: {}", rejection);
            METRICS.record_rejection(rejection);
            return reject(StatusCode::FORBIDDEN, rejection.to_string());
        }
    };

    if let Some(max_age) = state.config.max_auth_age {
        if let Err(e) = check_freshness(&fields, max_age, time::OffsetDateTime::now_utc()) {
            tracing::warn!("Verified init data failed freshness check: {}", e);
            METRICS.record_stale();
            return reject(StatusCode::FORBIDDEN, e.to_string());
        }
    }

    METRICS.verified.fetch_add(1, Ordering::Relaxed);

    let user = match parse_user(&fields) {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!("No usable user record in verified init data: {}", e);
            None
        }
    };
    tracing::debug!("Init data verified: fields={}, user_id={:?}", fields.len(), user.as_ref().map(|u| u.id));

    let profile_photo_url = match (&user, state.config.enrich_profile_photo) {
        (Some(user), true) => match state.photos.file_path_for(&user.id.to_string()).await {
            Ok(path) => path.as_deref().map(proxy_url),
            Err(e) => {
                tracing::warn!("Profile photo lookup failed for user_id={}: {}", user.id, e);
                None
            }
        },
        _ => None,
    };

    Json(VerifyResponse {
        ok: true,
        verified: true,
        data: fields,
        user,
        profile_photo_url,
    })
    .into_response()
}

async fn profile_photo_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PhotoQuery>,
) -> Response {
    let user_id = match query.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing user_id" }))).into_response(),
    };

    match state.photos.file_path_for(&user_id).await {
        Ok(path) => Json(PhotoResponse { photo_url: path.as_deref().map(proxy_url) }).into_response(),
        Err(e) => {
            tracing::error!("Bot API error for user_id={}: {}", user_id, e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": "telegram api error" }))).into_response()
        }
    }
}

async fn photo_proxy_handler(
    State(state): State<Arc<AppState>>,
    Path(file_path): Path<String>,
) -> Response {
    if !state.photos.is_known_path(&file_path).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.photos.download(&file_path).await {
        Ok(file) => {
            let content_type = file
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
                .unwrap_or(HeaderValue::from_static("application/octet-stream"));
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, content_type);
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=1800"));
            (headers, Body::from(file.bytes)).into_response()
        }
        Err(e) => {
            tracing::error!("Profile photo download failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": "telegram api error" }))).into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "initdata"
    }))
}

/// Metrics endpoint (Prometheus-compatible plain text)
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        METRICS.render(),
    )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build the full application router, talking to the configured Bot API.
pub fn router(config: AppConfig) -> Result<Router> {
    Ok(router_with_state(AppState::new(config)?))
}

pub fn router_with_state(state: AppState) -> Router {
    let rate_limit = state.config.rate_limit;
    let static_dir = state.config.static_dir.clone();
    let index_page = state.config.template_dir.join("index.html");
    let state = Arc::new(state);

    // Observability endpoints - NO rate limiting
    let observability_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let mut api_routes = Router::new()
        .route("/verify_init", post(verify_handler))
        .route("/get_profile_photo", get(profile_photo_handler))
        .route("/photo/*file_path", get(photo_proxy_handler))
        .with_state(state);

    if rate_limit {
        // Per client IP: burst of 30, one slot replenished every 100ms (10/sec)
        let governor_conf = GovernorConfigBuilder::default()
            .per_millisecond(100)
            .burst_size(30)
            .finish();

        match governor_conf {
            Some(conf) => {
                tracing::info!("Router configured with rate limiting: 10/sec, burst 30");
                api_routes = api_routes.layer(GovernorLayer {
                    config: Box::leak(Box::new(conf)),
                });
            }
            None => tracing::warn!("Invalid rate limit configuration, rate limiting disabled"),
        }
    } else {
        tracing::info!("Rate limiting disabled");
    }

    Router::new()
        .merge(observability_routes)
        .merge(api_routes)
        .route_service("/", ServeFile::new(index_page))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}
