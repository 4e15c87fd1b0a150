use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::ProxyError;
use crate::state::AppState;

/// 管理口令请求头
pub const ADMIN_HEADER: &str = "x-admin-password";

pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();
    // 只记录路径，查询串可能包含敏感参数
    tracing::info!(
        "{} {} - status: {}, latency: {}ms",
        method,
        path,
        response.status(),
        duration.as_millis()
    );
    response
}

/// 管理接口鉴权中间件
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok());

    let expected = state
        .config
        .admin_password
        .as_deref()
        .filter(|p| !p.is_empty());

    match (expected, provided) {
        (Some(expected), Some(given)) if secrets_match(expected, given) => next.run(req).await,
        _ => {
            tracing::warn!(
                "Rejected admin request to {} (missing or invalid password)",
                req.uri().path()
            );
            ProxyError::Unauthorized.into_response()
        }
    }
}

fn secrets_match(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("hunter2", "hunter2"));
        assert!(!secrets_match("hunter2", "hunter3"));
        assert!(!secrets_match("hunter2", "hunter22"));
        assert!(!secrets_match("hunter2", ""));
    }
}
