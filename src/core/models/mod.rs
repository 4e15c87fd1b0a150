//! 核心数据模型

mod proxy_config;

pub use proxy_config::{
    effective_limit, ProxyConfig, UpstreamProxyConfig, ANONYMOUS_HOURLY_LIMIT,
    PER_TOKEN_HOURLY_LIMIT, SERVICE_VERSION,
};
