//! Bounded per-node metric history
//!
//! Two shapes: [`MetricsHistory`] keeps whole metric snapshots for health
//! evaluation; [`SampleLog`] keeps flat (timestamp, metric, value) tuples,
//! the source of truth for pattern detection.

use crate::NetworkMetrics;
use chrono::{DateTime, Utc};
use mesh_common::MetricKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default ring-buffer capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A metrics snapshot with its capture time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimedMetrics {
    /// Capture time
    pub at: DateTime<Utc>,
    /// The snapshot
    pub metrics: NetworkMetrics,
}

/// Fixed-capacity ring of metric snapshots, FIFO eviction, O(1) push
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<TimedMetrics>,
    capacity: usize,
}

impl MetricsHistory {
    /// Create with the default capacity of 100
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create with a custom capacity (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest at capacity
    pub fn push(&mut self, at: DateTime<Utc>, metrics: NetworkMetrics) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(TimedMetrics { at, metrics });
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TimedMetrics> {
        self.samples.iter()
    }

    /// The `n` most recent snapshots, newest last
    pub fn recent(&self, n: usize) -> Vec<TimedMetrics> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only (timestamp, metric, value) tuple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Metric dimension
    pub metric: MetricKind,
    /// Observed value
    pub value: f64,
}

/// Bounded log of performance samples across metric kinds
#[derive(Debug, Clone)]
pub struct SampleLog {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
}

impl SampleLog {
    /// Create with a given capacity (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest at capacity
    pub fn record(&mut self, timestamp: DateTime<Utc>, metric: MetricKind, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(PerformanceSample {
            timestamp,
            metric,
            value,
        });
    }

    /// All samples of one metric kind, oldest first
    pub fn series(&self, metric: MetricKind) -> Vec<PerformanceSample> {
        self.samples
            .iter()
            .filter(|s| s.metric == metric)
            .copied()
            .collect()
    }

    /// Total retained samples across kinds
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for SampleLog {
    fn default() -> Self {
        // Room for ~100 sweeps of a handful of metric kinds
        Self::with_capacity(1024)
    }
}
