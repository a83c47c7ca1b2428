//! Observability: metrics collection and structured logging

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Metrics collector for tracking pipeline health
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                gauges: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        if value == 0 {
            return;
        }
        let mut inner = self.inner.write().await;
        let counter = inner.counters.entry(name.to_string()).or_insert(0);
        *counter += value;
    }

    /// Set a gauge value
    pub async fn gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(name.to_string(), value);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            gauges: inner.gauges.clone(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub uptime_secs: u64,
}

/// Structured logger for consistent log formatting
pub struct Logger;

impl Logger {
    /// Log a lifecycle transition for one strategy
    pub fn strategy_event(strategy_id: &str, event_type: &str, details: &str) {
        tracing::info!(
            strategy_id = %strategy_id,
            event_type = %event_type,
            details = %details,
            "strategy_event"
        );
    }

    /// Log a finished synthesis cycle
    pub fn cycle_event(cycle: u64, duration_ms: u64, births: usize, retirements: usize) {
        tracing::info!(cycle, duration_ms, births, retirements, "cycle_event");
    }

    /// Log a pipeline step that failed without aborting the cycle
    pub fn step_failure(cycle: u64, step: &str, error: &str) {
        tracing::warn!(cycle, step = %step, error = %error, "step_failure");
    }
}

/// Predefined metric names
pub mod metrics {
    // Ingestion
    pub const EVENTS_INGESTED: &str = "events_ingested_total";
    pub const MESSAGES_DROPPED: &str = "messages_dropped_total";
    pub const FEED_RECONNECTS: &str = "feed_reconnects_total";

    // Cycle
    pub const CYCLES_COMPLETED: &str = "cycles_completed_total";
    pub const CYCLES_SKIPPED: &str = "cycles_skipped_total";
    pub const STEP_FAILURES: &str = "step_failures_total";
    pub const CYCLE_DURATION_MS: &str = "cycle_duration_ms";

    // Lifecycle
    pub const STRATEGY_BIRTHS: &str = "strategy_births_total";
    pub const STRATEGY_PROMOTIONS: &str = "strategy_promotions_total";
    pub const STRATEGY_RETIREMENTS: &str = "strategy_retirements_total";
    pub const ACTIVE_STRATEGIES: &str = "active_strategies";

    // Paper trading
    pub const PAPER_ORDERS: &str = "paper_orders_total";
    pub const PAPER_HALTS: &str = "paper_halts_total";

    // GP
    pub const BEST_FITNESS: &str = "gp_best_fitness";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_and_gauges() {
        let m = MetricsCollector::new();
        m.increment(metrics::EVENTS_INGESTED, 3).await;
        m.increment(metrics::EVENTS_INGESTED, 2).await;
        m.increment(metrics::MESSAGES_DROPPED, 0).await;
        m.gauge(metrics::BEST_FITNESS, 0.75).await;

        assert_eq!(m.get_counter(metrics::EVENTS_INGESTED).await, 5);
        assert_eq!(m.get_counter(metrics::MESSAGES_DROPPED).await, 0);
        let snapshot = m.snapshot().await;
        assert_eq!(snapshot.gauges.get(metrics::BEST_FITNESS), Some(&0.75));
        assert!(!snapshot.counters.contains_key(metrics::MESSAGES_DROPPED));
    }
}
