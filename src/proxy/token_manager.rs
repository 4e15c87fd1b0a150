use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::storage::VaultError;
use crate::core::traits::TokenPersistence;
use crate::error::ProxyError;
use crate::proxy::rate_limit::RateLimitTracker;
use crate::proxy::usage::UsageRegistry;

/// 合法 Token 的最小长度
pub const MIN_TOKEN_LEN: usize = 21;

#[derive(Clone, PartialEq, Eq)]
pub struct ProxyToken {
    /// 稳定标识: SHA-256 前 16 位十六进制
    pub id: String,
    pub secret: String,
    /// 展示用: 前 8 位 + ... + 后 4 位
    pub masked: String,
}

impl ProxyToken {
    pub fn new(secret: String) -> Self {
        Self {
            id: token_id(&secret),
            masked: mask_token(&secret),
            secret,
        }
    }
}

impl fmt::Debug for ProxyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyToken")
            .field("id", &self.id)
            .field("masked", &self.masked)
            .finish()
    }
}

/// 对外展示的 Token 视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedToken {
    pub id: String,
    pub masked: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub added: usize,
    pub total: usize,
}

pub fn mask_token(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn secrets_of(tokens: &[ProxyToken]) -> Vec<String> {
    tokens.iter().map(|t| t.secret.clone()).collect()
}

pub fn token_id(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..8])
}

/// 轮换环：Token 序列 + 游标
struct TokenRing {
    tokens: Vec<ProxyToken>,
    cursor: AtomicUsize,
}

impl TokenRing {
    fn new(tokens: Vec<ProxyToken>) -> Self {
        Self {
            tokens,
            cursor: AtomicUsize::new(0),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.tokens.iter().any(|t| t.id == id)
    }
}

pub struct TokenManager {
    ring: RwLock<TokenRing>,
    // 串行化增删操作 (持久化期间不持有 ring 写锁)
    mutation: tokio::sync::Mutex<()>,
    vault: Arc<dyn TokenPersistence>,
    rate_limit_tracker: Arc<RateLimitTracker>,
    usage: Arc<UsageRegistry>,
}

impl TokenManager {
    /// 创建新的 TokenManager (空池，需调用 load_tokens 加载)
    pub fn new(
        vault: Arc<dyn TokenPersistence>,
        rate_limit_tracker: Arc<RateLimitTracker>,
        usage: Arc<UsageRegistry>,
    ) -> Self {
        Self {
            ring: RwLock::new(TokenRing::new(Vec::new())),
            mutation: tokio::sync::Mutex::new(()),
            vault,
            rate_limit_tracker,
            usage,
        }
    }

    /// 从加密存储加载 Token
    ///
    /// 任何读取/解密失败都退化为空池 (匿名模式)，不会中断启动。
    pub async fn load_tokens(&self) -> usize {
        let _guard = self.mutation.lock().await;

        let secrets = match self.vault.load() {
            Ok(secrets) => secrets,
            Err(VaultError::NotFound(path)) => {
                tracing::warn!(
                    "No token file at {:?}. Running in anonymous mode until tokens are added.",
                    path
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Failed to load tokens: {}. Running in anonymous mode.", e);
                Vec::new()
            }
        };

        let mut tokens: Vec<ProxyToken> = Vec::with_capacity(secrets.len());
        for secret in secrets {
            let token = ProxyToken::new(secret);
            if !tokens.iter().any(|t| t.id == token.id) {
                tokens.push(token);
            }
        }

        let count = tokens.len();
        self.install(tokens);
        count
    }

    /// 轮询获取下一个 Token，池为空时返回 None (匿名模式)
    pub fn next(&self) -> Option<ProxyToken> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let total = ring.tokens.len();
        if total == 0 {
            return None;
        }
        // 游标始终保持在 [0, total) 内
        let idx = ring
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % total))
            .unwrap_or_else(|c| c);
        ring.tokens.get(idx).cloned()
    }

    /// 在共享锁内执行统计更新
    ///
    /// 已被移除的 Token 传给 `f` 时变为 None，避免清空后又被在途请求重新写入统计。
    pub fn with_live_token<R>(
        &self,
        token: Option<&ProxyToken>,
        f: impl FnOnce(Option<&ProxyToken>) -> R,
    ) -> R {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let live = token.filter(|t| ring.contains(&t.id));
        f(live)
    }

    /// 脱敏后的 Token 列表
    pub fn list(&self) -> Vec<MaskedToken> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        ring.tokens
            .iter()
            .map(|t| MaskedToken {
                id: t.id.clone(),
                masked: t.masked.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 批量添加 Token (过滤过短与重复项)，返回实际新增数量
    pub async fn add(&self, candidates: Vec<String>) -> Result<AddOutcome, ProxyError> {
        let _guard = self.mutation.lock().await;

        let mut tokens = self.current_tokens();
        let mut added = 0;
        for candidate in candidates {
            let secret = candidate.trim();
            if secret.chars().count() < MIN_TOKEN_LEN {
                continue;
            }
            let token = ProxyToken::new(secret.to_string());
            if tokens.iter().any(|t| t.id == token.id) {
                continue;
            }
            tokens.push(token);
            added += 1;
        }

        if added == 0 {
            return Err(ProxyError::Validation("No valid tokens provided".to_string()));
        }

        self.vault.save(&secrets_of(&tokens))?;

        let total = tokens.len();
        self.install(tokens);
        tracing::info!("Added {} token(s), pool size is now {}", added, total);
        Ok(AddOutcome { added, total })
    }

    /// 按 id 移除单个 Token，返回剩余数量
    pub async fn remove(&self, id: &str) -> Result<usize, ProxyError> {
        let _guard = self.mutation.lock().await;

        let mut tokens = self.current_tokens();
        let Some(pos) = tokens.iter().position(|t| t.id == id) else {
            return Err(ProxyError::NotFound(format!("Token not found: {}", id)));
        };
        let removed = tokens.remove(pos);

        if tokens.is_empty() {
            self.vault.delete()?;
        } else {
            self.vault.save(&secrets_of(&tokens))?;
        }

        let remaining = tokens.len();
        self.install(tokens);
        tracing::warn!("Removed token {}, {} remaining", removed.masked, remaining);
        Ok(remaining)
    }

    /// 清空所有 Token 并删除持久化文件
    ///
    /// 内存状态总是被清空；文件删除失败时返回错误。
    pub async fn clear(&self) -> Result<(), ProxyError> {
        let _guard = self.mutation.lock().await;

        {
            let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
            *ring = TokenRing::new(Vec::new());
            self.usage.clear();
            self.rate_limit_tracker.clear_all();
        }
        tracing::warn!("All tokens cleared, running in anonymous mode");

        self.vault.delete()?;
        Ok(())
    }

    fn current_tokens(&self) -> Vec<ProxyToken> {
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
            .clone()
    }

    /// 替换 Token 序列，重置游标并同步统计 (在写锁内完成)
    fn install(&self, tokens: Vec<ProxyToken>) {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let live_ids: Vec<&str> = tokens.iter().map(|t| t.id.as_str()).collect();
        self.rate_limit_tracker.retain(&live_ids);
        self.usage.sync(&tokens);
        *ring = TokenRing::new(tokens);
    }
}
