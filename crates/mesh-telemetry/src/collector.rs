//! Metrics collector with hard probe deadlines
//!
//! Wraps a [`Prober`] in a timeout; a probe that misses its deadline is
//! abandoned and recorded as an unreachable sample rather than raised.
//! Packet loss is derived from a rolling window of probe outcomes, and
//! latency is EWMA-smoothed across samples so one slow round trip does
//! not whipsaw the quality score.

use crate::{NetworkMetrics, ProbeReading, Prober};
use dashmap::DashMap;
use mesh_common::NodeId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default probe deadline
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rolling probe-outcome window size for loss estimation
const LOSS_WINDOW: usize = 100;

/// EWMA smoothing factor for latency
const LATENCY_ALPHA: f64 = 0.2;

/// Outcome of one sampling pass against a node
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// The metrics to record for the node
    pub metrics: NetworkMetrics,
    /// Whether the probe completed in time
    pub reachable: bool,
}

/// Per-node probe bookkeeping
#[derive(Debug)]
struct ProbeState {
    outcomes: VecDeque<bool>,
    latency_ewma: Option<f64>,
}

impl ProbeState {
    fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(LOSS_WINDOW),
            latency_ewma: None,
        }
    }

    fn record_outcome(&mut self, success: bool) {
        if self.outcomes.len() >= LOSS_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn loss_pct(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64 * 100.0
    }

    fn smooth_latency(&mut self, raw_ms: f64) -> f64 {
        let smoothed = match self.latency_ewma {
            Some(prev) => LATENCY_ALPHA * raw_ms + (1.0 - LATENCY_ALPHA) * prev,
            None => raw_ms,
        };
        self.latency_ewma = Some(smoothed);
        smoothed
    }
}

/// Samples nodes through a prober and folds outcomes into metrics
pub struct MetricsCollector {
    prober: Arc<dyn Prober>,
    timeout: Duration,
    state: DashMap<NodeId, ProbeState>,
}

impl MetricsCollector {
    /// Create a collector with the default 5s deadline
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self::with_timeout(prober, DEFAULT_PROBE_TIMEOUT)
    }

    /// Create a collector with a custom deadline
    pub fn with_timeout(prober: Arc<dyn Prober>, timeout: Duration) -> Self {
        Self {
            prober,
            timeout,
            state: DashMap::new(),
        }
    }

    /// Sample one node
    ///
    /// Never errors: a timed-out or failed probe yields an unreachable
    /// sample with `reachable == false`. The expired probe future is
    /// dropped, not retried.
    pub async fn sample(&self, node_id: &NodeId, address: &str, port: u16) -> Sample {
        let attempt = tokio::time::timeout(self.timeout, self.prober.probe(address, port)).await;

        let mut state = self
            .state
            .entry(node_id.clone())
            .or_insert_with(ProbeState::new);

        match attempt {
            Ok(Ok(reading)) => {
                state.record_outcome(true);
                let metrics = Self::fold(&mut state, &reading);
                Sample {
                    metrics,
                    reachable: true,
                }
            }
            Ok(Err(err)) => {
                debug!(node = %node_id, %err, "probe failed");
                state.record_outcome(false);
                Sample {
                    metrics: self.unreachable_sample(),
                    reachable: false,
                }
            }
            Err(_elapsed) => {
                debug!(node = %node_id, timeout_ms = self.timeout.as_millis() as u64, "probe deadline expired");
                state.record_outcome(false);
                Sample {
                    metrics: self.unreachable_sample(),
                    reachable: false,
                }
            }
        }
    }

    fn fold(state: &mut ProbeState, reading: &ProbeReading) -> NetworkMetrics {
        NetworkMetrics {
            latency_ms: state.smooth_latency(reading.latency_ms),
            bandwidth_mbps: reading.bandwidth_mbps,
            packet_loss_pct: state.loss_pct(),
            uptime_pct: reading.uptime_pct,
            cpu_load_pct: reading.cpu_load_pct,
            memory_load_pct: reading.memory_load_pct,
        }
    }

    fn unreachable_sample(&self) -> NetworkMetrics {
        NetworkMetrics::unreachable(self.timeout.as_millis() as f64)
    }

    /// Configured probe deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticProber;

    fn reading(latency: f64) -> ProbeReading {
        ProbeReading {
            latency_ms: latency,
            bandwidth_mbps: 90.0,
            uptime_pct: 99.9,
            cpu_load_pct: 12.0,
            memory_load_pct: 35.0,
        }
    }

    #[tokio::test]
    async fn test_successful_sample() {
        let prober = Arc::new(StaticProber::new());
        prober.set("10.0.0.1", reading(20.0));
        let collector = MetricsCollector::new(prober);

        let sample = collector.sample(&"n1".into(), "10.0.0.1", 7700).await;
        assert!(sample.reachable);
        assert_eq!(sample.metrics.latency_ms, 20.0);
        assert_eq!(sample.metrics.packet_loss_pct, 0.0);
    }

    #[tokio::test]
    async fn test_latency_is_smoothed() {
        let prober = Arc::new(StaticProber::new());
        prober.set("10.0.0.1", reading(100.0));
        let collector = MetricsCollector::new(prober.clone());
        let id: NodeId = "n1".into();

        collector.sample(&id, "10.0.0.1", 7700).await;
        prober.set("10.0.0.1", reading(200.0));
        let second = collector.sample(&id, "10.0.0.1", 7700).await;

        // EWMA keeps the estimate between old and new
        assert!(second.metrics.latency_ms > 100.0);
        assert!(second.metrics.latency_ms < 200.0);
    }

    #[tokio::test]
    async fn test_failed_probe_records_unreachable() {
        let prober = Arc::new(StaticProber::new());
        let collector = MetricsCollector::new(prober);

        let sample = collector.sample(&"n1".into(), "10.9.9.9", 7700).await;
        assert!(!sample.reachable);
        assert_eq!(sample.metrics.packet_loss_pct, 100.0);
        assert_eq!(
            sample.metrics.quality_score(&crate::QualityWeights::default()),
            0.0
        );
    }

    #[tokio::test]
    async fn test_loss_ratio_from_window() {
        let prober = Arc::new(StaticProber::new());
        let collector = MetricsCollector::new(prober.clone());
        let id: NodeId = "n1".into();

        // One failure, then three successes
        collector.sample(&id, "10.0.0.1", 7700).await;
        prober.set("10.0.0.1", reading(20.0));
        for _ in 0..3 {
            collector.sample(&id, "10.0.0.1", 7700).await;
        }

        let sample = collector.sample(&id, "10.0.0.1", 7700).await;
        // 1 failure out of 5 outcomes
        assert!((sample.metrics.packet_loss_pct - 20.0).abs() < 1e-9);
    }
}
