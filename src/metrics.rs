// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Metric sink used by the seal health check.
//!
//! The server owns the real metrics pipeline; this crate only needs to set
//! labelled gauges. Two sinks ship with the crate:
//!
//! - [`TracingMetricSink`] emits every gauge as a `tracing` event
//! - [`InMemoryMetricSink`] keeps the last value per gauge, for status
//!   endpoints and tests

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Gauge key for the time since a seal backend was last seen healthy
/// (milliseconds, 0 while healthy).
pub const SEAL_UNREACHABLE_TIME: &[&str] = &["seal", "unreachable", "time"];

/// Metric label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Destination for gauges.
pub trait MetricSink: Send + Sync {
    fn set_gauge_with_labels(&self, key: &[&str], value: f32, labels: &[Label]);
}

/// Emits gauges as debug-level `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn set_gauge_with_labels(&self, key: &[&str], value: f32, labels: &[Label]) {
        let labels = labels
            .iter()
            .map(|l| format!("{}={}", l.name, l.value))
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(metric = %key.join("."), value, labels = %labels, "gauge");
    }
}

type GaugeKey = (String, Vec<Label>);

/// Keeps the latest value of every gauge.
#[derive(Debug, Default)]
pub struct InMemoryMetricSink {
    gauges: Mutex<BTreeMap<GaugeKey, f32>>,
}

impl InMemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value set for `key` with exactly `labels`.
    pub fn gauge(&self, key: &[&str], labels: &[Label]) -> Option<f32> {
        let gauges = self.gauges.lock().ok()?;
        gauges.get(&Self::gauge_key(key, labels)).copied()
    }

    fn gauge_key(key: &[&str], labels: &[Label]) -> GaugeKey {
        let mut labels = labels.to_vec();
        labels.sort();
        (key.join("."), labels)
    }
}

impl MetricSink for InMemoryMetricSink {
    fn set_gauge_with_labels(&self, key: &[&str], value: f32, labels: &[Label]) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(Self::gauge_key(key, labels), value);
        }
    }
}
