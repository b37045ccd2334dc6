mod config;
mod ebay;
mod http;
mod metrics;
mod models;
mod pipeline;
mod security;
mod vision;

use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use config::AppConfig;
use crate::http::build_client;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ListingRequest, ListingResponse, RawImage};
use pipeline::{Pipeline, PipelineError};
use reqwest::Client;
use security::{AuthContext, AuthState, require_api_auth};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "snaplist.api", "server crashed: {err}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    if let Err(err) = config.validate() {
        // /health still serves; listing runs will fail their preflight.
        warn!(
            target = "snaplist.api",
            "configuration incomplete: {err}"
        );
    }

    let auth_state = AuthState::from_env();
    let pipeline = Pipeline::new(config);
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}));

    let state = AppState {
        pipeline,
        fetcher: build_client(),
        openapi: Arc::new(openapi),
        idempotency: Arc::new(Mutex::new(HashMap::new())),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/listings", post(create_listing))
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "snaplist.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    fetcher: Client,
    openapi: Arc<serde_json::Value>,
    idempotency: Arc<Mutex<HashMap<String, ListingResponse>>>,
    prometheus_handle: PrometheusHandle,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "snaplist-api-rs",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Snaplist API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap_or_default()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap_or_default();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap_or_default()
}

/// Run the photo → draft-listing pipeline.
///
/// - Method: `POST`
/// - Path: `/listings`
/// - Auth: `Authorization: Bearer <key>` or `X-Snaplist-Key: <key>`
/// - Body: `ListingRequest` (one of `image_url` / `image_base64`, plus
///   optional `overrides`)
/// - Response: `ListingResponse`, or a stage-tagged error carrying the
///   remote footprint of the failed run
async fn create_listing(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<ListingRequest>,
) -> Result<Json<ListingResponse>, AppError> {
    metrics::inc_requests("/listings");
    info!(
        target = "snaplist.api",
        org_id = %context.org_id,
        api_key = %context.api_key_id,
        "listing pipeline invoked",
    );

    validate_overrides(&payload)?;
    let image = acquire_image(&state.fetcher, &payload).await?;

    if let Some(key) = idempotency_key(&headers) {
        if let Some(existing) = state.idempotency.lock().await.get(&key).cloned() {
            return Ok(Json(existing));
        }
        let response = state.pipeline.run(image, payload.overrides).await?;
        state.idempotency.lock().await.insert(key, response.clone());
        return Ok(Json(response));
    }

    let response = state.pipeline.run(image, payload.overrides).await?;
    Ok(Json(response))
}

fn validate_overrides(payload: &ListingRequest) -> Result<(), AppError> {
    if let Some(overrides) = &payload.overrides {
        if let Some(title) = &overrides.title {
            if title.trim().is_empty() || title.chars().count() > 80 {
                return Err(AppError::bad_request(
                    "invalid_override",
                    "title must be 1-80 characters",
                ));
            }
        }
        if let Some(description) = &overrides.description {
            if description.trim().is_empty() {
                return Err(AppError::bad_request(
                    "invalid_override",
                    "description must not be empty",
                ));
            }
        }
    }
    Ok(())
}

/// Turns the request's image source into in-memory bytes. Capture clients
/// re-encode to JPEG before submitting, so the bytes are treated as JPEG
/// from here on.
async fn acquire_image(fetcher: &Client, payload: &ListingRequest) -> Result<RawImage, AppError> {
    match (&payload.image_url, &payload.image_base64) {
        (Some(_), Some(_)) => Err(AppError::bad_request(
            "invalid_image_source",
            "provide image_url or image_base64, not both",
        )),
        (None, None) => Err(AppError::bad_request(
            "invalid_image_source",
            "provide image_url or image_base64",
        )),
        (Some(url), None) => fetch_image(fetcher, url).await,
        (None, Some(encoded)) => {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|err| AppError::bad_request("invalid_image_base64", err.to_string()))?;
            if bytes.is_empty() {
                return Err(AppError::bad_request(
                    "invalid_image_base64",
                    "decoded image is empty",
                ));
            }
            Ok(RawImage::jpeg(bytes))
        }
    }
}

async fn fetch_image(fetcher: &Client, url: &str) -> Result<RawImage, AppError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| AppError::bad_request("invalid_image_url", format!("not a URL: {url}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::bad_request(
            "invalid_image_url",
            format!("unsupported scheme: {}", parsed.scheme()),
        ));
    }

    let response = fetcher
        .get(parsed)
        .send()
        .await
        .map_err(|err| AppError::Acquisition(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Acquisition(format!(
            "HTTP {status} fetching image"
        )));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| AppError::Acquisition(err.to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::Acquisition("image fetch returned an empty body".into()));
    }
    Ok(RawImage::new(bytes.to_vec(), content_type))
}

fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(8 * 1024 * 1024)
}

#[derive(Debug)]
enum AppError {
    BadRequest { code: &'static str, detail: String },
    Acquisition(String),
    Pipeline(PipelineError),
}

impl AppError {
    fn bad_request(code: &'static str, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            detail: detail.into(),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest { code, detail } => {
                (StatusCode::BAD_REQUEST, Json(ApiError::new(code, detail))).into_response()
            }
            AppError::Acquisition(detail) => (
                StatusCode::BAD_GATEWAY,
                Json(ApiError::new("acquire_image", detail)),
            )
                .into_response(),
            AppError::Pipeline(err) => {
                let status = if err.is_config() {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::BAD_GATEWAY
                };
                let footprint = err.footprint();
                let payload = ApiError {
                    error: err.stage_name().to_string(),
                    detail: Some(err.detail()),
                    media_uploaded: (!err.is_config()).then_some(footprint.media_uploaded),
                    inventory_sku: footprint.inventory_sku,
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
