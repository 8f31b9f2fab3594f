//! Per-(provider, tool) performance metrics and the routing score.
//!
//! Entries are created lazily on first record and survive provider
//! disconnection, so a provider that comes back keeps its history. Updates
//! are linearizable: each record happens under the entry's map shard lock.

use std::time::SystemTime;

use dashmap::DashMap;

/// Rolling call statistics for one `(provider, tool)` pair.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub total_calls: u64,
    pub failure_count: u64,
    /// `(total_calls - failure_count) / total_calls`, recomputed on every
    /// update; 1.0 before the first call.
    pub success_rate: f64,
    /// Running mean of observed latencies.
    pub avg_response_time_ms: f64,
    pub last_used: SystemTime,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_calls: 0,
            failure_count: 0,
            success_rate: 1.0,
            avg_response_time_ms: 0.0,
            last_used: SystemTime::now(),
        }
    }
}

/// Thread-safe metrics store keyed by `(provider_id, tool_name)`.
#[derive(Debug, Default)]
pub struct MetricsStore {
    entries: DashMap<(String, String), PerformanceMetrics>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call outcome. Creates the entry on first use.
    pub fn record(&self, provider_id: &str, tool_name: &str, success: bool, elapsed_ms: u64) {
        let key = (provider_id.to_string(), tool_name.to_string());
        let mut entry = self.entries.entry(key).or_default();

        entry.total_calls += 1;
        if !success {
            entry.failure_count += 1;
        }
        entry.last_used = SystemTime::now();
        entry.success_rate =
            (entry.total_calls - entry.failure_count) as f64 / entry.total_calls as f64;
        entry.avg_response_time_ms +=
            (elapsed_ms as f64 - entry.avg_response_time_ms) / entry.total_calls as f64;
    }

    /// Current metrics for a pair, if any call has ever been recorded.
    pub fn get(&self, provider_id: &str, tool_name: &str) -> Option<PerformanceMetrics> {
        self.entries
            .get(&(provider_id.to_string(), tool_name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Routing score for a pair; 0.5 (neutral) when nothing was recorded yet.
    pub fn score(&self, provider_id: &str, tool_name: &str) -> f64 {
        self.get(provider_id, tool_name)
            .map(|m| score_metrics(&m))
            .unwrap_or(0.5)
    }

    /// Snapshot of every recorded pair, for introspection tools.
    pub fn snapshot(&self) -> Vec<((String, String), PerformanceMetrics)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Blend success rate, latency, and recency into one score in `[0, 1]`.
///
/// A pair that was never called scores a neutral 0.5 so fresh providers are
/// neither preferred nor shunned. Latencies at or above ten seconds zero out
/// the response component; recency decays in steps at 1h, 24h, and one week.
pub fn score_metrics(metrics: &PerformanceMetrics) -> f64 {
    if metrics.total_calls == 0 {
        return 0.5;
    }

    let response_score = (1.0 - metrics.avg_response_time_ms / 10_000.0).max(0.0);

    let hours_idle = metrics
        .last_used
        .elapsed()
        .map(|d| d.as_secs_f64() / 3600.0)
        .unwrap_or(0.0);
    let recency_score = if hours_idle < 1.0 {
        1.0
    } else if hours_idle < 24.0 {
        0.8
    } else if hours_idle < 168.0 {
        0.6
    } else {
        0.4
    };

    0.5 * metrics.success_rate + 0.3 * response_score + 0.2 * recency_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_created_lazily() {
        let store = MetricsStore::new();
        assert!(store.get("a", "read").is_none());
        store.record("a", "read", true, 100);
        assert!(store.get("a", "read").is_some());
    }

    #[test]
    fn counters_stay_consistent() {
        let store = MetricsStore::new();
        for i in 0..10 {
            store.record("a", "read", i % 3 != 0, 50);
        }
        let m = store.get("a", "read").unwrap();
        assert!(m.failure_count <= m.total_calls);
        assert_eq!(m.total_calls, 10);
        assert_eq!(m.failure_count, 4);
        let expected = (m.total_calls - m.failure_count) as f64 / m.total_calls as f64;
        assert_eq!(m.success_rate, expected);
    }

    #[test]
    fn running_mean_tracks_latency() {
        let store = MetricsStore::new();
        store.record("a", "read", true, 100);
        store.record("a", "read", true, 300);
        let m = store.get("a", "read").unwrap();
        assert!((m.avg_response_time_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn unused_pair_scores_neutral() {
        let store = MetricsStore::new();
        assert_eq!(store.score("nobody", "nothing"), 0.5);
        assert_eq!(score_metrics(&PerformanceMetrics::default()), 0.5);
    }

    #[test]
    fn reliable_provider_outscores_flaky_one() {
        // 10 calls each, recent: one flaky but fast, one perfect but slower.
        let store = MetricsStore::new();
        for i in 0..10 {
            store.record("flaky", "read", i >= 2, 100);
            store.record("steady", "read", true, 200);
        }

        let flaky = store.score("flaky", "read");
        let steady = store.score("steady", "read");

        // 0.5*0.8 + 0.3*0.99 + 0.2*1.0 vs 0.5*1.0 + 0.3*0.98 + 0.2*1.0
        assert!((flaky - 0.897).abs() < 1e-9, "got {flaky}");
        assert!((steady - 0.994).abs() < 1e-9, "got {steady}");
        assert!(steady > flaky);
    }

    #[test]
    fn slow_responses_zero_out_latency_component() {
        let mut m = PerformanceMetrics::default();
        m.total_calls = 1;
        m.avg_response_time_ms = 15_000.0;
        m.success_rate = 1.0;
        let score = score_metrics(&m);
        // 0.5*1.0 + 0.3*0 + 0.2*1.0
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn snapshot_is_sorted_and_complete() {
        let store = MetricsStore::new();
        store.record("b", "z", true, 10);
        store.record("a", "y", true, 10);
        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0 .0, "a");
        assert_eq!(rows[1].0 .0, "b");
    }
}
