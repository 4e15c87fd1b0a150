use crate::proxy::log_store::ProxyLogEntry;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

#[derive(serde::Deserialize)]
pub struct LogQueryParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(serde::Serialize)]
pub struct LogsResponse {
    pub logs: Vec<ProxyLogEntry>,
    pub total: usize,
}

/// 分页读取最近的代理请求，最新的在前
pub async fn get_proxy_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogQueryParams>,
) -> Json<LogsResponse> {
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);
    let logs = state.log_store.get_logs(limit, offset);
    let total = state.log_store.len();

    Json(LogsResponse { logs, total })
}
