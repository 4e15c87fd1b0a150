use dashmap::DashMap;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::models::ANONYMOUS_HOURLY_LIMIT;
use crate::proxy::token_manager::ProxyToken;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// 限流快照 (总是来自上游响应头，本地从不递减)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub remaining: u64,
    pub limit: u64,
    /// 重置时间 (Unix 秒)
    pub reset: i64,
}

impl RateLimitSnapshot {
    /// 从上游响应头解析，三个字段缺一不可
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let field = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };

        Some(Self {
            remaining: field(HEADER_REMAINING)?.parse().ok()?,
            limit: field(HEADER_LIMIT)?.parse().ok()?,
            reset: field(HEADER_RESET)?.parse().ok()?,
        })
    }

    /// 启动时的全局默认值：匿名配额，一小时后重置
    pub fn anonymous_default() -> Self {
        Self {
            remaining: ANONYMOUS_HOURLY_LIMIT,
            limit: ANONYMOUS_HOURLY_LIMIT,
            reset: chrono::Utc::now().timestamp() + 3600,
        }
    }
}

/// Token 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenHealth {
    #[default]
    Active,
    RateLimited,
    Invalid,
}

/// 单个 Token 的限流状态
#[derive(Debug, Clone, Serialize)]
pub struct TokenRateState {
    pub masked: String,
    pub snapshot: Option<RateLimitSnapshot>,
    pub health: TokenHealth,
    pub last_status: u16,
}

impl TokenRateState {
    fn recompute_health(&mut self) {
        self.health = if is_auth_failure(self.last_status) {
            TokenHealth::Invalid
        } else if self.snapshot.map(|s| s.remaining == 0).unwrap_or(false) {
            TokenHealth::RateLimited
        } else {
            TokenHealth::Active
        };
    }
}

/// 限流跟踪器
pub struct RateLimitTracker {
    global: RwLock<RateLimitSnapshot>,
    tokens: DashMap<String, TokenRateState>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            global: RwLock::new(RateLimitSnapshot::anonymous_default()),
            tokens: DashMap::new(),
        }
    }

    /// 根据一次上游响应更新限流状态
    ///
    /// # Arguments
    /// * `token` - 本次使用的 Token，匿名请求为 None
    /// * `snapshot` - 响应头中解析出的限流信息
    /// * `status` - 上游 HTTP 状态码
    pub fn update(
        &self,
        token: Option<&ProxyToken>,
        snapshot: Option<RateLimitSnapshot>,
        status: u16,
    ) {
        if let Some(snapshot) = snapshot {
            *self.global.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        }

        let Some(token) = token else {
            return;
        };

        let mut state = self
            .tokens
            .entry(token.id.clone())
            .or_insert_with(|| TokenRateState {
                masked: token.masked.clone(),
                snapshot: None,
                health: TokenHealth::Active,
                last_status: 0,
            });

        if snapshot.is_some() {
            state.snapshot = snapshot;
        }
        state.last_status = status;
        let previous = state.health;
        state.recompute_health();

        if state.health != previous {
            tracing::warn!(
                "Token {} health changed: {:?} -> {:?} (status {})",
                token.masked,
                previous,
                state.health,
                status
            );
        }
    }

    /// 全局最近一次的限流快照
    pub fn snapshot(&self) -> RateLimitSnapshot {
        *self.global.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// 所有 Token 的限流状态 (token id -> state)
    pub fn per_token(&self) -> HashMap<String, TokenRateState> {
        self.tokens
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// 获取指定 Token 的限流状态
    pub fn get(&self, token_id: &str) -> Option<TokenRateState> {
        self.tokens.get(token_id).map(|r| r.clone())
    }

    pub fn health(&self, token_id: &str) -> TokenHealth {
        self.tokens
            .get(token_id)
            .map(|r| r.health)
            .unwrap_or_default()
    }

    /// 仅保留仍在池中的 Token
    pub fn retain(&self, live_ids: &[&str]) {
        self.tokens.retain(|id, _| live_ids.contains(&id.as_str()));
    }

    /// 清除所有限流记录 (全局快照回到匿名默认值)
    pub fn clear_all(&self) {
        let count = self.tokens.len();
        self.tokens.clear();
        *self.global.write().unwrap_or_else(PoisonError::into_inner) =
            RateLimitSnapshot::anonymous_default();
        tracing::debug!("Cleared {} per-token rate limit records", count);
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_auth_failure(status: u16) -> bool {
    status == 401
}

/// 判断上游响应是否为限流拒绝：403 且正文包含 "rate limit" (不区分大小写)
///
/// 依赖上游的文案，措辞变化会导致漏判。
pub fn is_rate_limit_rejection(status: u16, body: &str) -> bool {
    status == 403 && body.to_lowercase().contains("rate limit")
}
