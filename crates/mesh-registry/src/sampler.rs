//! Background sampling and heartbeat sweeping
//!
//! Two periodic workers keep the registry current without touching the
//! request path: the sampler probes every non-unreachable node each pass
//! and folds outcomes into the registry, and the sweep worker expires
//! nodes whose heartbeats have gone quiet. A node that fails its probe
//! is recorded and skipped, never allowed to stall the pass.

use crate::NodeRegistry;
use chrono::Utc;
use mesh_common::NodeHealth;
use mesh_telemetry::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default pause between sampling passes
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically probes known nodes and records the outcomes
pub struct SamplerWorker {
    registry: Arc<NodeRegistry>,
    collector: Arc<MetricsCollector>,
    interval: Duration,
}

impl SamplerWorker {
    /// Create a worker with the default pass interval
    pub fn new(registry: Arc<NodeRegistry>, collector: Arc<MetricsCollector>) -> Self {
        Self::with_interval(registry, collector, DEFAULT_SAMPLE_INTERVAL)
    }

    /// Create a worker with a custom pass interval
    pub fn with_interval(
        registry: Arc<NodeRegistry>,
        collector: Arc<MetricsCollector>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            collector,
            interval,
        }
    }

    /// One sampling pass over a snapshot of the registry
    ///
    /// Unreachable nodes are skipped; the heartbeat path revives them.
    /// Returns how many nodes were sampled.
    pub async fn tick(&self) -> usize {
        let nodes = self.registry.snapshot();
        let mut sampled = 0;
        for node in nodes {
            if node.health == NodeHealth::Unreachable {
                continue;
            }
            let sample = self
                .collector
                .sample(&node.id, &node.address, node.port)
                .await;
            if !sample.reachable {
                debug!(node = %node.id, "sample pass: node did not respond");
            }
            self.registry.update_metrics(&node.id, Utc::now(), &sample);
            sampled += 1;
        }
        sampled
    }

    /// Run sampling passes forever at the configured interval
    pub async fn run(self) {
        info!(interval_s = self.interval.as_secs(), "sampler started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

/// Periodically expires nodes whose heartbeats have lapsed
pub struct HealthSweepWorker {
    registry: Arc<NodeRegistry>,
}

impl HealthSweepWorker {
    /// Create a sweep worker over the given registry
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// One sweep pass; returns how many nodes were newly expired
    pub fn tick(&self) -> usize {
        self.registry.sweep(Utc::now())
    }

    /// Run sweep passes forever, once per heartbeat interval
    pub async fn run(self) {
        let period = self.registry.config().heartbeat_interval;
        info!(interval_s = period.as_secs(), "heartbeat sweep started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}
