//! `MetricRouter`: name-keyed meter/instrument registry over an
//! OpenTelemetry-shaped façade (component table row "Metric router", spec
//! §2). The original wires `AggregateMetricInterface` instances per
//! `(transaction_phase, metric_name)` and increments them per
//! `reporting_origin` label (`front_end_service_v2.cc`'s
//! `total_request_counter_->Add(1, {phase, reporting_origin})`); this keeps
//! the same three-part key shape (`metric_name`, `phase`, `reporting_origin`)
//! over a flat, atomic-counter-backed map rather than a real OTel SDK, since
//! the exporter pipeline itself is out of scope (spec §1).
//!
//! Gated by `otel_enabled` (spec §6): when disabled, increments are no-ops
//! and reads return zero, matching a deployment that never stood up the
//! meter provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The three metric names the front end emits into (spec §4.8, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    TotalRequests,
    ClientErrors,
    ServerErrors,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    metric: MetricName,
    phase: &'static str,
    reporting_origin: &'static str,
}

pub struct MetricRouter {
    enabled: bool,
    counters: Mutex<HashMap<CounterKey, AtomicU64>>,
}

impl MetricRouter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Increments `metric` under `(phase, reporting_origin)` by one. A no-op
    /// when the router is disabled.
    pub fn increment(&self, metric: MetricName, phase: &'static str, reporting_origin: &'static str) {
        if !self.enabled {
            return;
        }
        let key = CounterKey {
            metric,
            phase,
            reporting_origin,
        };
        let mut counters = self.counters.lock().expect("metric router mutex poisoned");
        counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of `(metric, phase, reporting_origin)`, or zero if
    /// never incremented (or the router is disabled).
    pub fn get(&self, metric: MetricName, phase: &'static str, reporting_origin: &'static str) -> u64 {
        let key = CounterKey {
            metric,
            phase,
            reporting_origin,
        };
        let counters = self.counters.lock().expect("metric router mutex poisoned");
        counters
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_key() {
        let router = MetricRouter::new(true);
        router.increment(MetricName::TotalRequests, "prepare", "Operator");
        router.increment(MetricName::TotalRequests, "prepare", "Operator");
        router.increment(MetricName::TotalRequests, "prepare", "Coordinator");
        assert_eq!(router.get(MetricName::TotalRequests, "prepare", "Operator"), 2);
        assert_eq!(router.get(MetricName::TotalRequests, "prepare", "Coordinator"), 1);
    }

    #[test]
    fn distinct_metric_names_do_not_share_counters() {
        let router = MetricRouter::new(true);
        router.increment(MetricName::ClientErrors, "prepare", "Operator");
        assert_eq!(router.get(MetricName::ClientErrors, "prepare", "Operator"), 1);
        assert_eq!(router.get(MetricName::ServerErrors, "prepare", "Operator"), 0);
    }

    #[test]
    fn disabled_router_never_records() {
        let router = MetricRouter::new(false);
        router.increment(MetricName::TotalRequests, "prepare", "Operator");
        assert_eq!(router.get(MetricName::TotalRequests, "prepare", "Operator"), 0);
    }
}
