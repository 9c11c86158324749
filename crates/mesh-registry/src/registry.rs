//! Keyed node store with atomic replace-on-write entries

use crate::{MeshNode, NodeCapabilities};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_common::{MeshError, MeshResult, MetricKind, NodeHealth, NodeId};
use mesh_telemetry::{MetricsHistory, PerformanceSample, QualityWeights, Sample, SampleLog};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sustained-strain thresholds driving the Degraded transition
#[derive(Debug, Clone, Copy)]
pub struct StrainThresholds {
    /// CPU load above this strains a sample
    pub cpu_pct: f64,
    /// Memory load above this strains a sample
    pub memory_pct: f64,
    /// Latency above this strains a sample
    pub latency_ms: f64,
    /// Consecutive strained samples before the node is Degraded
    pub consecutive: usize,
}

impl Default for StrainThresholds {
    fn default() -> Self {
        Self {
            cpu_pct: 90.0,
            memory_pct: 85.0,
            latency_ms: 400.0,
            consecutive: 10,
        }
    }
}

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Expected heartbeat interval
    pub heartbeat_interval: Duration,
    /// Missed heartbeats before a node is marked Unreachable
    pub missed_heartbeats: u32,
    /// Metric snapshots retained per node
    pub history_capacity: usize,
    /// Flat samples retained per node for pattern detection
    pub sample_log_capacity: usize,
    /// Strain thresholds
    pub strain: StrainThresholds,
    /// Quality weights used for summary and health evaluation
    pub quality: QualityWeights,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            missed_heartbeats: 3,
            history_capacity: 100,
            sample_log_capacity: 4096,
            strain: StrainThresholds::default(),
            quality: QualityWeights::default(),
        }
    }
}

impl RegistryConfig {
    /// Validate configuration; fatal at startup when violated
    pub fn validate(&self) -> MeshResult<()> {
        self.quality.validate()?;
        if self.missed_heartbeats == 0 {
            return Err(MeshError::Configuration(
                "missed_heartbeats must be at least 1".into(),
            ));
        }
        if self.strain.consecutive == 0 {
            return Err(MeshError::Configuration(
                "strain.consecutive must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(MeshError::Configuration(
                "heartbeat_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Per-node retained history
struct NodeHistory {
    metrics: MetricsHistory,
    samples: SampleLog,
}

/// Point-in-time view of the mesh for monitoring surfaces
#[derive(Debug, Clone)]
pub struct TopologySummary {
    /// Total known nodes, unreachable included
    pub node_count: usize,
    /// Nodes currently Active
    pub active_count: usize,
    /// Mean latency across Active nodes, ms
    pub avg_latency_ms: f64,
    /// Node counts per region label
    pub per_region: HashMap<String, usize>,
    /// Mean Active quality scaled by the Active fraction, in [0,1]
    pub network_health: f64,
}

/// In-memory node catalog
///
/// Each entry is an `ArcSwap` so writes replace the node whole and
/// readers never observe a half-updated entry. Samplers racing on the
/// same node resolve last-writer-wins; metrics are advisory.
pub struct NodeRegistry {
    nodes: DashMap<NodeId, ArcSwap<MeshNode>>,
    histories: DashMap<NodeId, RwLock<NodeHistory>>,
    config: RegistryConfig,
}

impl NodeRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    ///
    /// Callers should run [`RegistryConfig::validate`] first; an invalid
    /// config here is a startup bug.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            nodes: DashMap::new(),
            histories: DashMap::new(),
            config,
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register or refresh a node (idempotent upsert)
    ///
    /// Concurrent registration of the same id resolves by most-recent
    /// heartbeat: an older registration never overwrites a newer one.
    pub fn register(&self, node: MeshNode) {
        let id = node.id.clone();
        match self.nodes.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let current = entry.get().load();
                if node.last_seen >= current.last_seen {
                    entry.get().store(Arc::new(node));
                    debug!(node = %id, "node registration refreshed");
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(ArcSwap::from_pointee(node));
                info!(node = %id, "node registered");
            }
        }

        self.histories.entry(id).or_insert_with(|| {
            RwLock::new(NodeHistory {
                metrics: MetricsHistory::with_capacity(self.config.history_capacity),
                samples: SampleLog::with_capacity(self.config.sample_log_capacity),
            })
        });
    }

    /// Fetch one node
    pub fn get(&self, id: &NodeId) -> Option<Arc<MeshNode>> {
        self.nodes.get(id).map(|entry| entry.load_full())
    }

    /// Record a heartbeat, reviving Unreachable nodes
    ///
    /// Returns false for unknown ids.
    pub fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.nodes.get(id) else {
            return false;
        };
        entry.rcu(|current| {
            let mut node = MeshNode::clone(current);
            node.last_seen = now;
            if node.health == NodeHealth::Unreachable {
                info!(node = %id, "node reachable again");
                node.health = NodeHealth::Active;
            }
            node
        });
        true
    }

    /// Fold a sampling outcome into the node entry and its history
    ///
    /// Returns false for unknown ids. Health moves to Degraded on
    /// sustained strain and back to Active when strain clears; the
    /// Unreachable transition belongs to the heartbeat sweep.
    pub fn update_metrics(&self, id: &NodeId, now: DateTime<Utc>, sample: &Sample) -> bool {
        let Some(entry) = self.nodes.get(id) else {
            return false;
        };

        let strained = {
            let Some(history) = self.histories.get(id) else {
                return false;
            };
            let mut history = history.write();
            history.metrics.push(now, sample.metrics);

            let quality = sample.metrics.quality_score(&self.config.quality);
            history.samples.record(now, MetricKind::Latency, sample.metrics.latency_ms);
            history.samples.record(now, MetricKind::Bandwidth, sample.metrics.bandwidth_mbps);
            history.samples.record(now, MetricKind::CpuLoad, sample.metrics.cpu_load_pct);
            history.samples.record(now, MetricKind::MemoryLoad, sample.metrics.memory_load_pct);
            history.samples.record(now, MetricKind::Quality, quality);

            self.sustained_strain(&history.metrics)
        };

        // rcu so a capability or heartbeat write landing mid-update is
        // folded in rather than reverted; only the metric fields and the
        // strain-driven health state belong to this writer
        let next = if strained {
            NodeHealth::Degraded
        } else {
            NodeHealth::Active
        };
        let prev = entry.rcu(|current| {
            let mut node = MeshNode::clone(current);
            node.metrics = sample.metrics;
            if sample.reachable {
                node.last_seen = now;
                node.health = next;
            }
            node
        });
        if sample.reachable && prev.health != next {
            info!(node = %id, from = ?prev.health, to = ?next, "health transition");
        }
        true
    }

    /// Force a node Unreachable (audit-retained, excluded from scoring)
    pub fn mark_unreachable(&self, id: &NodeId) -> bool {
        let Some(entry) = self.nodes.get(id) else {
            return false;
        };
        entry.rcu(|current| {
            let mut node = MeshNode::clone(current);
            if node.health != NodeHealth::Unreachable {
                warn!(node = %id, "node marked unreachable");
                node.health = NodeHealth::Unreachable;
            }
            node
        });
        true
    }

    /// Replace a node's advertised capabilities
    ///
    /// Applied by the adaptive capacity manager; the entry swaps whole.
    pub fn update_capabilities(&self, id: &NodeId, capabilities: NodeCapabilities) -> bool {
        let Some(entry) = self.nodes.get(id) else {
            return false;
        };
        entry.rcu(|current| {
            let mut node = MeshNode::clone(current);
            node.capabilities = capabilities.clone();
            node
        });
        true
    }

    /// Mark nodes Unreachable after too many missed heartbeats
    ///
    /// Returns how many transitions occurred. Unreachable nodes are
    /// retained for audit.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = chrono::Duration::from_std(
            self.config.heartbeat_interval * self.config.missed_heartbeats,
        )
        .unwrap_or_else(|_| chrono::Duration::seconds(90));

        let mut transitions = 0;
        for entry in self.nodes.iter() {
            let current = entry.value().load();
            if current.health == NodeHealth::Unreachable || now - current.last_seen <= cutoff {
                continue;
            }
            // Re-check inside the rcu loop: a heartbeat racing this sweep
            // refreshes last_seen and must win over the expiry
            let prev = entry.value().rcu(|node| {
                let mut node = MeshNode::clone(node);
                if node.health != NodeHealth::Unreachable && now - node.last_seen > cutoff {
                    node.health = NodeHealth::Unreachable;
                }
                node
            });
            if prev.health != NodeHealth::Unreachable && now - prev.last_seen > cutoff {
                warn!(node = %prev.id, last_seen = %prev.last_seen, "missed heartbeats, marking unreachable");
                transitions += 1;
            }
        }
        transitions
    }

    /// Point-in-time snapshot of every node
    pub fn snapshot(&self) -> Vec<Arc<MeshNode>> {
        self.nodes.iter().map(|entry| entry.value().load_full()).collect()
    }

    /// Snapshot filtered by a predicate
    pub fn list<F>(&self, filter: F) -> Vec<Arc<MeshNode>>
    where
        F: Fn(&MeshNode) -> bool,
    {
        self.nodes
            .iter()
            .map(|entry| entry.value().load_full())
            .filter(|node| filter(node))
            .collect()
    }

    /// Clone of a node's retained metric snapshots
    pub fn history(&self, id: &NodeId) -> Option<MetricsHistory> {
        self.histories.get(id).map(|h| h.read().metrics.clone())
    }

    /// A node's flat samples for one metric kind, oldest first
    pub fn samples(&self, id: &NodeId, kind: MetricKind) -> Vec<PerformanceSample> {
        self.histories
            .get(id)
            .map(|h| h.read().samples.series(kind))
            .unwrap_or_default()
    }

    /// Summary for monitoring surfaces
    pub fn topology_summary(&self) -> TopologySummary {
        let nodes = self.snapshot();
        let node_count = nodes.len();

        let mut per_region: HashMap<String, usize> = HashMap::new();
        for node in &nodes {
            *per_region.entry(node.region_label().to_string()).or_insert(0) += 1;
        }

        let active: Vec<_> = nodes
            .iter()
            .filter(|n| n.health == NodeHealth::Active)
            .collect();
        let active_count = active.len();

        let avg_latency_ms = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|n| n.metrics.latency_ms).sum::<f64>() / active.len() as f64
        };

        let network_health = if node_count == 0 || active.is_empty() {
            0.0
        } else {
            let mean_quality = active
                .iter()
                .map(|n| n.metrics.quality_score(&self.config.quality))
                .sum::<f64>()
                / active.len() as f64;
            mean_quality * active_count as f64 / node_count as f64
        };

        TopologySummary {
            node_count,
            active_count,
            avg_latency_ms,
            per_region,
            network_health,
        }
    }

    fn sustained_strain(&self, history: &MetricsHistory) -> bool {
        let limits = &self.config.strain;
        let recent = history.recent(limits.consecutive);
        if recent.len() < limits.consecutive {
            return false;
        }
        recent.iter().all(|timed| {
            let m = &timed.metrics;
            m.cpu_load_pct > limits.cpu_pct
                || m.memory_load_pct > limits.memory_pct
                || m.latency_ms > limits.latency_ms
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
