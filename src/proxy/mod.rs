// proxy 模块 - Token 轮换反代引擎

pub mod dispatcher; // 请求调度 (含匿名回退)
pub mod log_store; // 请求日志
pub mod mappers; // 错误映射
pub mod rate_limit; // 限流跟踪
pub mod token_manager; // Token 存储与轮询
pub mod upstream; // 上游客户端
pub mod usage; // 使用统计

pub use dispatcher::{ProxyDispatcher, ProxyRequest, ProxyResponse};
pub use log_store::{LogStore, ProxyLogEntry};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker, TokenHealth};
pub use token_manager::{ProxyToken, TokenManager};
pub use upstream::UpstreamClient;
pub use usage::{UsageRecord, UsageRegistry, UsageTotals};
