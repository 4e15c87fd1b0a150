//! Token 使用统计

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::proxy::token_manager::ProxyToken;

/// 单个 Token 的使用记录
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub token_id: String,
    pub masked: String,
    pub usage_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// endpoint -> 请求次数
    pub endpoints: BTreeMap<String, u64>,
    pub last_used: Option<i64>,
    #[serde(skip)]
    order: u64,
}

impl UsageRecord {
    fn new(token: &ProxyToken, order: u64) -> Self {
        Self {
            token_id: token.id.clone(),
            masked: token.masked.clone(),
            usage_count: 0,
            success_count: 0,
            error_count: 0,
            endpoints: BTreeMap::new(),
            last_used: None,
            order,
        }
    }

    /// 使用次数最多的 n 个 endpoint (次数相同按路径排序)
    pub fn top_endpoints(&self, n: usize) -> Vec<EndpointCount> {
        let mut endpoints: Vec<EndpointCount> = self
            .endpoints
            .iter()
            .map(|(endpoint, count)| EndpointCount {
                endpoint: endpoint.clone(),
                count: *count,
            })
            .collect();
        // BTreeMap 已按路径有序，稳定排序即可保持次序
        endpoints.sort_by(|a, b| b.count.cmp(&a.count));
        endpoints.truncate(n);
        endpoints
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: u64,
}

/// 汇总统计 (不包含匿名请求)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub total_requests: u64,
    pub total_success: u64,
    pub total_errors: u64,
}

/// 按 Token 维度的使用统计
pub struct UsageRegistry {
    records: DashMap<String, UsageRecord>,
    next_order: AtomicU64,
}

impl UsageRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_order: AtomicU64::new(0),
        }
    }

    fn next_order(&self) -> u64 {
        self.next_order.fetch_add(1, Ordering::SeqCst)
    }

    /// 确保 Token 有一条记录 (已有则保持不变)
    pub fn ensure(&self, token: &ProxyToken) {
        self.records
            .entry(token.id.clone())
            .or_insert_with(|| UsageRecord::new(token, self.next_order()));
    }

    /// 记录一次请求结果，匿名请求 (None) 不计入
    pub fn record(&self, token: Option<&ProxyToken>, endpoint: &str, success: bool) {
        let Some(token) = token else {
            return;
        };

        let mut record = self
            .records
            .entry(token.id.clone())
            .or_insert_with(|| UsageRecord::new(token, self.next_order()));

        record.usage_count += 1;
        if success {
            record.success_count += 1;
        } else {
            record.error_count += 1;
        }
        *record.endpoints.entry(endpoint.to_string()).or_insert(0) += 1;
        record.last_used = Some(chrono::Utc::now().timestamp());
    }

    /// 所有记录，按使用次数降序，次数相同按创建顺序
    pub fn snapshot(&self) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then(a.order.cmp(&b.order))
        });
        records
    }

    pub fn get(&self, token_id: &str) -> Option<UsageRecord> {
        self.records.get(token_id).map(|r| r.clone())
    }

    pub fn aggregate(&self) -> UsageTotals {
        self.records
            .iter()
            .fold(UsageTotals::default(), |mut totals, r| {
                totals.total_requests += r.usage_count;
                totals.total_success += r.success_count;
                totals.total_errors += r.error_count;
                totals
            })
    }

    /// 与当前 Token 列表同步：删除已移除 Token 的记录，为新 Token 建立空记录
    pub fn sync(&self, tokens: &[ProxyToken]) {
        self.records.retain(|id, _| tokens.iter().any(|t| &t.id == id));
        for token in tokens {
            self.ensure(token);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl Default for UsageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(seed: char) -> ProxyToken {
        ProxyToken::new(format!("ghp_{}", seed.to_string().repeat(30)))
    }

    #[test]
    fn test_record_counts_once() {
        let registry = UsageRegistry::new();
        let t = token('a');

        registry.record(Some(&t), "/users/octocat", true);
        registry.record(Some(&t), "/users/octocat", false);
        registry.record(Some(&t), "/repos/a/b", true);

        let record = registry.get(&t.id).unwrap();
        assert_eq!(record.usage_count, 3);
        assert_eq!(record.success_count, 2);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.endpoints["/users/octocat"], 2);
        assert_eq!(record.endpoints["/repos/a/b"], 1);
        assert!(record.last_used.is_some());
    }

    #[test]
    fn test_anonymous_is_not_recorded() {
        let registry = UsageRegistry::new();
        registry.record(None, "/users/octocat", true);
        assert!(registry.is_empty());
        assert_eq!(registry.aggregate(), UsageTotals::default());
    }

    #[test]
    fn test_snapshot_order_breaks_ties_by_insertion() {
        let registry = UsageRegistry::new();
        let (a, b, c) = (token('a'), token('b'), token('c'));
        registry.sync(&[a.clone(), b.clone(), c.clone()]);

        registry.record(Some(&c), "/x", true);
        registry.record(Some(&c), "/x", true);
        registry.record(Some(&b), "/x", true);
        registry.record(Some(&a), "/x", true);

        let order: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|r| r.token_id)
            .collect();
        assert_eq!(order, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn test_aggregate_matches_per_token_sum() {
        let registry = UsageRegistry::new();
        let (a, b) = (token('a'), token('b'));
        for i in 0..7 {
            registry.record(Some(&a), "/a", i % 3 != 0);
        }
        for _ in 0..5 {
            registry.record(Some(&b), "/b", false);
        }

        let totals = registry.aggregate();
        let sum: u64 = registry.snapshot().iter().map(|r| r.usage_count).sum();
        assert_eq!(totals.total_requests, sum);
        assert_eq!(totals.total_requests, 12);
        assert_eq!(totals.total_success + totals.total_errors, 12);

        registry.clear();
        assert_eq!(registry.aggregate().total_requests, 0);
    }

    #[test]
    fn test_sync_drops_removed_and_keeps_existing() {
        let registry = UsageRegistry::new();
        let (a, b) = (token('a'), token('b'));
        registry.record(Some(&a), "/a", true);
        registry.record(Some(&b), "/b", true);

        registry.sync(&[a.clone()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&a.id).unwrap().usage_count, 1);
        assert!(registry.get(&b.id).is_none());
    }

    #[test]
    fn test_top_endpoints() {
        let registry = UsageRegistry::new();
        let t = token('a');
        let counts = [("/a", 1), ("/b", 5), ("/c", 3), ("/d", 3), ("/e", 2), ("/f", 4)];
        for (endpoint, n) in counts {
            for _ in 0..n {
                registry.record(Some(&t), endpoint, true);
            }
        }

        let top = registry.get(&t.id).unwrap().top_endpoints(5);
        let names: Vec<&str> = top.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(names, vec!["/b", "/f", "/c", "/d", "/e"]);
    }
}
