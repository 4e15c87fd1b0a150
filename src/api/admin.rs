use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::models::{effective_limit, PER_TOKEN_HOURLY_LIMIT};
use crate::error::ProxyError;
use crate::proxy::log_store::ProxyLogEntry;
use crate::proxy::token_manager::MaskedToken;
use crate::proxy::usage::{EndpointCount, UsageTotals};
use crate::proxy::{RateLimitSnapshot, TokenHealth};
use crate::state::AppState;

/// 统计页展示的最近请求条数
const STATS_RECENT_REQUESTS: usize = 20;
/// token-details 中每个 Token 展示的 endpoint 数量
const TOP_ENDPOINTS: usize = 5;

#[derive(Serialize)]
pub struct TokenListResponse {
    pub count: usize,
    pub tokens: Vec<MaskedToken>,
    pub effective_limit: u64,
}

pub async fn list_tokens(State(state): State<Arc<AppState>>) -> Json<TokenListResponse> {
    let tokens = state.token_manager.list();
    Json(TokenListResponse {
        count: tokens.len(),
        effective_limit: effective_limit(tokens.len()),
        tokens,
    })
}

#[derive(Deserialize)]
pub struct AddTokensRequest {
    #[serde(default)]
    pub tokens: Vec<String>,
}

pub async fn add_tokens(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddTokensRequest>,
) -> Result<Json<Value>, ProxyError> {
    if payload.tokens.is_empty() {
        return Err(ProxyError::Validation("No tokens provided".to_string()));
    }

    let outcome = state.token_manager.add(payload.tokens).await?;
    Ok(Json(json!({
        "success": true,
        "total_tokens": outcome.total,
        "new_tokens_added": outcome.added,
    })))
}

pub async fn clear_tokens(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ProxyError> {
    state.token_manager.clear().await?;
    Ok(Json(json!({
        "success": true,
        "message": "All tokens cleared",
    })))
}

pub async fn remove_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    let remaining = state.token_manager.remove(&id).await?;
    Ok(Json(json!({
        "success": true,
        "total_tokens": remaining,
    })))
}

#[derive(Serialize)]
pub struct TokenSummary {
    pub count: usize,
    pub effective_limit: u64,
    pub per_token_limit: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub tokens: TokenSummary,
    pub usage: UsageTotals,
    pub current_rate_limit: RateLimitSnapshot,
    /// 本地时区的可读重置时间
    pub reset_time: String,
    pub recent_requests: Vec<ProxyLogEntry>,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let count = state.token_manager.len();
    let snapshot = state.rate_limits.snapshot();

    Json(StatsResponse {
        tokens: TokenSummary {
            count,
            effective_limit: effective_limit(count),
            per_token_limit: PER_TOKEN_HOURLY_LIMIT,
        },
        usage: state.usage.aggregate(),
        current_rate_limit: snapshot,
        reset_time: format_reset(snapshot.reset),
        recent_requests: state.log_store.recent(STATS_RECENT_REQUESTS),
    })
}

fn format_reset(reset: i64) -> String {
    Local
        .timestamp_opt(reset, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| reset.to_string())
}

#[derive(Serialize)]
pub struct TokenDetail {
    pub id: String,
    pub token: String,
    pub usage_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_used: Option<i64>,
    pub health: TokenHealth,
    pub rate_limit: Option<RateLimitSnapshot>,
    pub top_endpoints: Vec<EndpointCount>,
}

pub async fn token_details(State(state): State<Arc<AppState>>) -> Json<Value> {
    let details: Vec<TokenDetail> = state
        .usage
        .snapshot()
        .into_iter()
        .map(|record| {
            let rate = state.rate_limits.get(&record.token_id);
            TokenDetail {
                top_endpoints: record.top_endpoints(TOP_ENDPOINTS),
                health: rate.as_ref().map(|r| r.health).unwrap_or_default(),
                rate_limit: rate.and_then(|r| r.snapshot),
                id: record.token_id,
                token: record.masked,
                usage_count: record.usage_count,
                success_count: record.success_count,
                error_count: record.error_count,
                last_used: record.last_used,
            }
        })
        .collect();

    Json(json!({
        "count": details.len(),
        "tokens": details,
    }))
}

pub async fn test_auth() -> Json<Value> {
    Json(json!({ "authenticated": true }))
}
