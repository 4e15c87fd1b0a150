//! 代理请求调度
//! 选择 Token -> 请求上游 -> 更新统计 -> 限流时匿名重试一次

use bytes::Bytes;
use reqwest::header::HeaderValue;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ProxyError;
use crate::proxy::log_store::{LogStore, ANONYMOUS_LABEL};
use crate::proxy::rate_limit::{is_rate_limit_rejection, RateLimitSnapshot, RateLimitTracker};
use crate::proxy::token_manager::{ProxyToken, TokenManager};
use crate::proxy::upstream::{UpstreamClient, UpstreamError, UpstreamResponse};
use crate::proxy::usage::UsageRegistry;

/// 入站请求描述
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// 上游路径 (不含 /api/ 前缀)
    pub path: String,
    /// 原始查询串
    pub query: Option<String>,
}

impl ProxyRequest {
    pub fn new(path: impl Into<String>, query: Option<String>) -> Self {
        Self {
            path: path.into(),
            query,
        }
    }

    /// 统计与日志中使用的 endpoint
    pub fn endpoint(&self) -> String {
        format!("/{}", self.path.trim_start_matches('/'))
    }
}

/// 返回给调用方的上游结果
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    /// 是否由匿名重试产生
    pub fallback_used: bool,
}

impl ProxyResponse {
    fn from_upstream(response: UpstreamResponse, fallback_used: bool) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type().cloned(),
            body: response.body,
            fallback_used,
        }
    }
}

pub struct ProxyDispatcher {
    tokens: Arc<TokenManager>,
    rate_limits: Arc<RateLimitTracker>,
    usage: Arc<UsageRegistry>,
    logs: Arc<LogStore>,
    upstream: Arc<UpstreamClient>,
}

impl ProxyDispatcher {
    pub fn new(
        tokens: Arc<TokenManager>,
        rate_limits: Arc<RateLimitTracker>,
        usage: Arc<UsageRegistry>,
        logs: Arc<LogStore>,
        upstream: Arc<UpstreamClient>,
    ) -> Self {
        Self {
            tokens,
            rate_limits,
            usage,
            logs,
            upstream,
        }
    }

    /// 处理一次入站代理请求
    ///
    /// 最多一次上游请求加一次匿名重试 (首次已是匿名时同样重试一次)；锁不会跨越网络请求持有。
    pub async fn dispatch(&self, request: &ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let endpoint = request.endpoint();
        let token = self.tokens.next();

        let (response, rate_limited) = self.attempt(request, &endpoint, token.as_ref()).await?;

        if !rate_limited {
            return Ok(ProxyResponse::from_upstream(response, false));
        }

        tracing::warn!(
            "{} hit the rate limit on {}, retrying anonymously",
            token
                .as_ref()
                .map(|t| t.masked.as_str())
                .unwrap_or(ANONYMOUS_LABEL),
            endpoint
        );
        let (fallback, _) = self.attempt(request, &endpoint, None).await?;
        Ok(ProxyResponse::from_upstream(fallback, true))
    }

    /// 单次上游请求，并记录限流、统计与日志
    ///
    /// 返回上游响应以及是否为限流拒绝。
    async fn attempt(
        &self,
        request: &ProxyRequest,
        endpoint: &str,
        token: Option<&ProxyToken>,
    ) -> Result<(UpstreamResponse, bool), ProxyError> {
        let label = token.map(|t| t.masked.as_str()).unwrap_or(ANONYMOUS_LABEL);
        let started = Instant::now();

        let result = self
            .upstream
            .get(
                &request.path,
                request.query.as_deref(),
                token.map(|t| t.secret.as_str()),
            )
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let rate_limited = is_rate_limit_rejection(response.status, &response.text());
                let snapshot = RateLimitSnapshot::from_headers(&response.headers);

                self.tokens.with_live_token(token, |live| {
                    self.rate_limits.update(live, snapshot, response.status);
                    self.usage.record(live, endpoint, !rate_limited);
                });
                self.logs
                    .append(endpoint, label, response.status, latency_ms, None);

                tracing::debug!(
                    "GET {} via {} -> {} ({}ms)",
                    endpoint,
                    label,
                    response.status,
                    latency_ms
                );
                Ok((response, rate_limited))
            }
            Err(e) => Err(self.transport_failure(endpoint, label, token, latency_ms, e)),
        }
    }

    fn transport_failure(
        &self,
        endpoint: &str,
        label: &str,
        token: Option<&ProxyToken>,
        latency_ms: u64,
        error: UpstreamError,
    ) -> ProxyError {
        tracing::error!(
            "Upstream request to {} via {} failed [{}]: {}",
            endpoint,
            label,
            error.kind(),
            error
        );

        self.tokens.with_live_token(token, |live| {
            self.usage.record(live, endpoint, false);
        });
        self.logs
            .append(endpoint, label, 500, latency_ms, Some(error.to_string()));

        ProxyError::UpstreamTransport(error.to_string())
    }
}
