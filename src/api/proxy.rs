use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::models::{effective_limit, SERVICE_VERSION};
use crate::error::ProxyError;
use crate::proxy::{ProxyRequest, ProxyResponse, RateLimitSnapshot};
use crate::state::AppState;

/// 代理 GET /api/{upstreamPath}
///
/// 路径与查询串都取自原始 URI，保持上游编码不变。
pub async fn proxy_upstream(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let path = uri.path().strip_prefix("/api/").unwrap_or_default();
    let request = ProxyRequest::new(path, uri.query().map(str::to_string));

    match state.dispatcher.dispatch(&request).await {
        Ok(response) => upstream_response(response),
        Err(e) => e.into_response(),
    }
}

/// 原样返回上游状态码、正文和 Content-Type
fn upstream_response(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = (status, response.body).into_response();
    if let Some(content_type) = response.content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    out
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub core: Value,
    pub tokens_configured: usize,
    pub effective_limit: u64,
}

/// GET /api/rate-limit
///
/// 通过轮换池查询上游 rate_limit；非 200 时返回缓存的全局快照。
pub async fn rate_limit_status(State(state): State<Arc<AppState>>) -> Response {
    let request = ProxyRequest::new("rate_limit", None);
    let tokens = state.token_manager.len();

    let core = match state.dispatcher.dispatch(&request).await {
        Ok(response) if response.status == 200 => serde_json::from_slice::<Value>(&response.body)
            .ok()
            .and_then(|body| body.get("rate").cloned()),
        Ok(_) => None,
        Err(e) => return e.into_response(),
    };
    let core = core.unwrap_or_else(|| cached_snapshot(state.rate_limits.snapshot()));

    Json(RateLimitStatus {
        core,
        tokens_configured: tokens,
        effective_limit: effective_limit(tokens),
    })
    .into_response()
}

fn cached_snapshot(snapshot: RateLimitSnapshot) -> Value {
    serde_json::to_value(snapshot).unwrap_or(Value::Null)
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tokens = state.token_manager.len();
    Json(json!({
        "status": "healthy",
        "tokens_active": tokens > 0,
        "token_count": tokens,
        "effective_limit": effective_limit(tokens),
        "version": SERVICE_VERSION,
    }))
}

/// GET /
pub async fn index(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tokens = state.token_manager.len();
    Json(json!({
        "name": "GitHub API Token Proxy",
        "version": SERVICE_VERSION,
        "status": "running",
        "tokens_configured": tokens,
        "effective_rate_limit": format!("{}/hour", effective_limit(tokens)),
        "endpoints": {
            "public": {
                "/api/<path>": "Proxy upstream API (GET)",
                "/api/rate-limit": "Upstream rate limit status",
                "/health": "Health check"
            },
            "admin": {
                "/admin/tokens": "Manage tokens (requires X-Admin-Password)",
                "/admin/stats": "View statistics (requires X-Admin-Password)",
                "/admin/token-details": "Per-token analytics (requires X-Admin-Password)",
                "/admin/logs": "Recent proxied requests (requires X-Admin-Password)"
            }
        }
    }))
}

pub async fn not_found(uri: Uri) -> ProxyError {
    ProxyError::NotFound(format!("No route for {}", uri.path()))
}
