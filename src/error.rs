use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::core::storage::VaultError;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// 上游网络/超时错误，对调用方表现为 500
    #[error("{0}")]
    UpstreamTransport(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized - Invalid admin password")]
    Unauthorized,

    #[error("failed to persist tokens: {0}")]
    Persistence(#[from] VaultError),

    #[error("{0}")]
    NotFound(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UpstreamTransport(_) | ProxyError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ProxyError::UpstreamTransport(_) => "Upstream error",
            ProxyError::Validation(_) => "Bad request",
            ProxyError::Unauthorized => "Unauthorized",
            ProxyError::Persistence(_) => "Server error",
            ProxyError::NotFound(_) => "Not found",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
