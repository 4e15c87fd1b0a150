use std::sync::Arc;

use crate::core::models::ProxyConfig;
use crate::core::traits::TokenPersistence;
use crate::proxy::upstream::UpstreamError;
use crate::proxy::{
    LogStore, ProxyDispatcher, RateLimitTracker, TokenManager, UpstreamClient, UsageRegistry,
};

/// Web 应用状态
///
/// 进程内唯一的服务对象，所有共享状态都在这里构造并注入到路由。
pub struct AppState {
    pub config: ProxyConfig,
    pub token_manager: Arc<TokenManager>,
    pub rate_limits: Arc<RateLimitTracker>,
    pub usage: Arc<UsageRegistry>,
    pub log_store: Arc<LogStore>,
    pub dispatcher: ProxyDispatcher,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        vault: Arc<dyn TokenPersistence>,
    ) -> Result<Self, UpstreamError> {
        let rate_limits = Arc::new(RateLimitTracker::new());
        let usage = Arc::new(UsageRegistry::new());
        let log_store = Arc::new(LogStore::default());
        let upstream = Arc::new(UpstreamClient::new(&config)?);

        let token_manager = Arc::new(TokenManager::new(
            vault,
            rate_limits.clone(),
            usage.clone(),
        ));

        let dispatcher = ProxyDispatcher::new(
            token_manager.clone(),
            rate_limits.clone(),
            usage.clone(),
            log_store.clone(),
            upstream,
        );

        Ok(Self {
            config,
            token_manager,
            rate_limits,
            usage,
            log_store,
            dispatcher,
        })
    }
}
