//! 代理服务配置

use serde::{Deserialize, Serialize};

/// 单个 Token 每小时的上游配额
pub const PER_TOKEN_HOURLY_LIMIT: u64 = 5000;

/// 匿名访问每小时的上游配额
pub const ANONYMOUS_HOURLY_LIMIT: u64 = 60;

/// 服务版本 (对外展示)
pub const SERVICE_VERSION: &str = "2.0";

/// 按当前 Token 数量估算的每小时有效配额
pub fn effective_limit(token_count: usize) -> u64 {
    if token_count == 0 {
        ANONYMOUS_HOURLY_LIMIT
    } else {
        token_count as u64 * PER_TOKEN_HOURLY_LIMIT
    }
}

/// 反代服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 监听端口
    pub port: u16,

    /// 管理口令 (X-Admin-Password)，未设置时管理接口全部拒绝
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,

    /// 允许的 CORS 来源，包含 "*" 时放行全部
    pub allowed_origins: Vec<String>,

    /// 上游 API 根地址
    pub upstream_base_url: String,

    /// 上游请求超时时间(秒)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// 上游代理配置
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,

    /// 发往上游的 User-Agent
    pub user_agent: String,
}

/// 上游代理配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    /// 是否启用
    pub enabled: bool,
    /// 代理地址 (http://, https://, socks5://)
    pub url: String,
}

impl UpstreamProxyConfig {
    pub fn from_url(url: Option<String>) -> Self {
        match url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Self { enabled: true, url },
            None => Self::default(),
        }
    }
}

impl ProxyConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            admin_password: None,
            allowed_origins: vec!["*".to_string()],
            upstream_base_url: "https://api.github.com".to_string(),
            request_timeout: default_request_timeout(),
            upstream_proxy: UpstreamProxyConfig::default(),
            user_agent: format!("GitHub-Token-Proxy/{}", SERVICE_VERSION),
        }
    }
}

fn default_request_timeout() -> u64 {
    10 // 默认 10 秒
}
