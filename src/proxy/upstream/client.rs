//! 上游客户端
//! 封装对上游 REST API 的 GET 请求

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::core::models::ProxyConfig;
use crate::proxy::mappers::classify_upstream_error;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{}", classify_upstream_error(.0).1)]
    Request(#[from] reqwest::Error),
}

impl UpstreamError {
    /// 日志用错误类型
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUrl(_) => "url_error",
            UpstreamError::Request(e) => classify_upstream_error(e).0,
        }
    }
}

/// 上游响应 (完整读入内存)
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.headers.get(CONTENT_TYPE)
    }
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, UpstreamError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers);

        if config.upstream_proxy.enabled && !config.upstream_proxy.url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.upstream_proxy.url)?;
            builder = builder.proxy(proxy);
            tracing::info!("Outbound requests routed via {}", config.upstream_proxy.url);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 拼接上游地址，查询串原样转发
    pub fn build_url(&self, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?;
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }

    /// 发起 GET 请求；token 为 None 时不携带 Authorization
    pub async fn get(
        &self,
        path: &str,
        query: Option<&str>,
        token: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.build_url(path, query)?;

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
