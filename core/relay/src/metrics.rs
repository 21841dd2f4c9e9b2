// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Counters emitted by the relay
//!
//! The relay does not own a metrics backend; it reports through an injected
//! [`MetricsSink`].

use std::collections::HashMap;

use parking_lot::Mutex;

pub const ROUTE_COUNTER: &str = "relay.route";
pub const NOT_FOUND_COUNTER: &str = "relay.not_found";
pub const FORWARD_FAILURE_COUNTER: &str = "relay.forward_failure";

pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, tags: &[(&str, &str)]);
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str, _tags: &[(&str, &str)]) {}
}

/// Keeps counters in memory, keyed by name and tags
#[derive(Debug, Default)]
pub struct CountingMetrics {
    counters: Mutex<HashMap<String, u64>>,
}

fn counter_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut tags: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    tags.sort();
    format!("{name}{{{}}}", tags.join(","))
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of one counter, tags in any order
    pub fn count(&self, name: &str, tags: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .get(&counter_key(name, tags))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter over every tag combination
    pub fn total(&self, name: &str) -> u64 {
        let prefix = format!("{name}{{");
        self.counters
            .lock()
            .iter()
            .filter(|(key, _)| key.as_str() == name || key.starts_with(&prefix))
            .map(|(_, value)| value)
            .sum()
    }
}

impl MetricsSink for CountingMetrics {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        *self
            .counters
            .lock()
            .entry(counter_key(name, tags))
            .or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_metrics() {
        let metrics = CountingMetrics::new();
        metrics.increment(ROUTE_COUNTER, &[("route", "service")]);
        metrics.increment(ROUTE_COUNTER, &[("route", "service")]);
        metrics.increment(ROUTE_COUNTER, &[("route", "shard")]);
        metrics.increment(NOT_FOUND_COUNTER, &[]);
        metrics.increment(FORWARD_FAILURE_COUNTER, &[("b", "2"), ("a", "1")]);

        assert_eq!(metrics.count(ROUTE_COUNTER, &[("route", "service")]), 2);
        assert_eq!(metrics.count(ROUTE_COUNTER, &[("route", "default")]), 0);
        assert_eq!(metrics.total(ROUTE_COUNTER), 3);
        assert_eq!(metrics.count(NOT_FOUND_COUNTER, &[]), 1);
        assert_eq!(
            metrics.count(FORWARD_FAILURE_COUNTER, &[("a", "1"), ("b", "2")]),
            1
        );
    }
}
