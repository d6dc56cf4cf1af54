//! Per-process request and spend counters.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendUsage {
    pub requests: u64,
    pub failures: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_cost: f64,
    pub backends: BTreeMap<String, BackendUsage>,
}

impl UsageStats {
    pub(crate) fn record_request(&mut self, cache_hit: bool) {
        self.total_requests += 1;
        if cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    pub(crate) fn record_success(&mut self, backend: &str, cost: f64) {
        let entry = self.backends.entry(backend.to_string()).or_default();
        entry.requests += 1;
        entry.cost += cost;
        self.total_cost += cost;
    }

    pub(crate) fn record_failure(&mut self, backend: &str) {
        let entry = self.backends.entry(backend.to_string()).or_default();
        entry.requests += 1;
        entry.failures += 1;
    }

    pub fn backend(&self, name: &str) -> Option<&BackendUsage> {
        self.backends.get(name)
    }
}
