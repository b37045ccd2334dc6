use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

/// Service-level API keys, distinct from the marketplace bearer credential.
/// `SNAPLIST_API_KEYS` holds comma-separated `org:key` pairs.
#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, AuthContext>>,
}

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub org_id: String,
    pub api_key_id: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        Self {
            records: Arc::new(load_keys_from_env()),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).cloned()
    }
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        return Ok(unauthorized(
            "missing_api_key",
            "Provide X-Snaplist-Key or a Bearer token",
        ));
    };
    let Some(context) = state.authenticate(&presented) else {
        return Ok(unauthorized("invalid_api_key", "Key not recognized"));
    };
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .filter(|raw| raw.len() > 7 && raw[..6].eq_ignore_ascii_case("bearer"))
        .map(|raw| raw[6..].trim().to_string())
        .filter(|value| !value.is_empty());
    if bearer.is_some() {
        return bearer;
    }
    headers
        .get("X-Snaplist-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized(code: &str, message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::new(code, message))).into_response()
}

fn load_keys_from_env() -> HashMap<String, AuthContext> {
    let raw = env::var("SNAPLIST_API_KEYS").unwrap_or_else(|_| "demo-org:demo-key".to_string());
    let mut records = HashMap::new();
    for (idx, entry) in raw.split(',').enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(':') {
            Some((org, key)) if !org.trim().is_empty() && !key.trim().is_empty() => {
                records.insert(
                    key.trim().to_string(),
                    AuthContext {
                        org_id: org.trim().to_string(),
                        api_key_id: format!("key-{:02}", idx + 1),
                    },
                );
            }
            _ => warn!(
                target = "snaplist.api",
                "ignored malformed SNAPLIST_API_KEYS entry: {entry}"
            ),
        }
    }

    if records.is_empty() {
        warn!(
            target = "snaplist.api",
            "SNAPLIST_API_KEYS produced no keys; falling back to demo credentials"
        );
        records.insert(
            "demo-key".to_string(),
            AuthContext {
                org_id: "demo-org".to_string(),
                api_key_id: "key-01".to_string(),
            },
        );
    } else {
        info!(
            target = "snaplist.api",
            key_count = records.len(),
            "loaded API keys from env"
        );
    }

    records
}
