//! 代理请求日志
//! 使用内存环形缓冲区保存最近的请求

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// 默认保留条数
pub const MAX_LOG_ENTRIES: usize = 100;

/// 匿名请求在日志中的 Token 标识
pub const ANONYMOUS_LABEL: &str = "anonymous";

/// 代理日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyLogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub endpoint: String,
    /// 脱敏后的 Token，匿名请求为 "anonymous"
    pub token: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub error: Option<String>,
}

struct Ring {
    entries: VecDeque<ProxyLogEntry>,
    next_id: u64,
}

/// 日志存储（环形缓冲区）
pub struct LogStore {
    logs: RwLock<Ring>,
    max_size: usize,
}

impl LogStore {
    /// 创建新的日志存储
    pub fn new(max_size: usize) -> Self {
        Self {
            logs: RwLock::new(Ring {
                entries: VecDeque::with_capacity(max_size),
                next_id: 1,
            }),
            max_size,
        }
    }

    /// 追加一条日志，超出容量时丢弃最旧的
    pub fn append(
        &self,
        endpoint: &str,
        token: &str,
        status_code: u16,
        latency_ms: u64,
        error: Option<String>,
    ) {
        let mut logs = self.logs.write().unwrap_or_else(PoisonError::into_inner);

        let entry = ProxyLogEntry {
            id: logs.next_id,
            timestamp: chrono::Utc::now().timestamp(),
            endpoint: endpoint.to_string(),
            token: token.to_string(),
            status_code,
            latency_ms,
            error,
        };
        logs.next_id += 1;
        logs.entries.push_back(entry);

        while logs.entries.len() > self.max_size {
            logs.entries.pop_front();
        }
    }

    /// 最近的 n 条日志，按时间正序
    pub fn recent(&self, n: usize) -> Vec<ProxyLogEntry> {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        let skip = logs.entries.len().saturating_sub(n);
        logs.entries.iter().skip(skip).cloned().collect()
    }

    /// 获取日志（支持分页，最新的在前）
    pub fn get_logs(&self, limit: usize, offset: usize) -> Vec<ProxyLogEntry> {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);

        logs.entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// 获取日志总数
    pub fn len(&self) -> usize {
        self.logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清除所有日志
    pub fn clear(&self) {
        let mut logs = self.logs.write().unwrap_or_else(PoisonError::into_inner);
        logs.entries.clear();
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(MAX_LOG_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bounded_fifo_eviction() {
        let store = LogStore::default();
        for i in 1..=150u16 {
            store.append(&format!("/e{}", i), ANONYMOUS_LABEL, 200, 0, None);
        }

        assert_eq!(store.len(), 100);
        let recent = store.recent(100);
        let endpoints: Vec<String> = recent.iter().map(|e| e.endpoint.clone()).collect();
        let expected: Vec<String> = (51..=150).map(|i| format!("/e{}", i)).collect();
        assert_eq!(endpoints, expected);
        assert_eq!(recent.first().unwrap().id, 51);
    }

    #[test]
    fn test_recent_caps_to_length() {
        let store = LogStore::default();
        store.append("/a", ANONYMOUS_LABEL, 200, 1, None);
        store.append("/b", "ghp_abcd...wxyz", 403, 2, None);

        let recent = store.recent(20);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].endpoint, "/a");
        assert_eq!(recent[1].endpoint, "/b");
        assert_eq!(store.recent(1)[0].endpoint, "/b");
    }

    #[test]
    fn test_get_logs_newest_first() {
        let store = LogStore::new(10);
        for i in 0..5 {
            store.append(&format!("/p{}", i), ANONYMOUS_LABEL, 200, 0, None);
        }
        let page = store.get_logs(2, 1);
        assert_eq!(page[0].endpoint, "/p3");
        assert_eq!(page[1].endpoint, "/p2");

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_appends_keep_bound() {
        let store = Arc::new(LogStore::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(&format!("/t{}/{}", t, i), ANONYMOUS_LABEL, 200, 0, None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let recent = store.recent(100);
        assert_eq!(recent.len(), 100);
        // id 连续且无重复
        let ids: Vec<u64> = recent.iter().map(|e| e.id).collect();
        let expected: Vec<u64> = (301..=400).collect();
        assert_eq!(ids, expected);
    }
}
