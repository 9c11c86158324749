//! Load balancer
//!
//! Routes requests to healthy, under-loaded nodes using live
//! connections-per-capacity ratios with a small random jitter to avoid
//! herding. Overloaded nodes are deprioritized until they fall below a
//! lower hysteresis threshold, so a node hovering near the limit does
//! not flap in and out of rotation.

#![warn(missing_docs)]

use dashmap::DashMap;
use mesh_common::{MeshError, MeshResult, NodeId, NodeRole};
use mesh_registry::{MeshNode, NodeRegistry};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Balancer tuning
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Load ratio at which a node is deprioritized
    pub overload_enter: f64,
    /// Load ratio below which a deprioritized node rejoins rotation
    pub overload_exit: f64,
    /// Fixed rebalance interval
    pub rebalance_interval: Duration,
    /// Random jitter added to the load ratio when picking, breaking herds
    pub jitter: f64,
    /// Fraction of routing decisions steered away from recovering nodes
    pub redirect_fraction: f64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overload_enter: 0.85,
            overload_exit: 0.70,
            rebalance_interval: Duration::from_secs(30),
            jitter: 0.05,
            redirect_fraction: 0.8,
        }
    }
}

impl BalancerConfig {
    /// Validate hysteresis ordering and ranges; fatal at startup
    pub fn validate(&self) -> MeshResult<()> {
        if !(0.0 < self.overload_exit && self.overload_exit < self.overload_enter) {
            return Err(MeshError::Configuration(format!(
                "hysteresis exit {} must be below enter {}",
                self.overload_exit, self.overload_enter
            )));
        }
        if self.overload_enter > 1.0 {
            return Err(MeshError::Configuration(
                "overload_enter must not exceed 1.0".into(),
            ));
        }
        if self.jitter < 0.0 || !(0.0..=1.0).contains(&self.redirect_fraction) {
            return Err(MeshError::Configuration(
                "jitter must be non-negative and redirect_fraction in [0,1]".into(),
            ));
        }
        Ok(())
    }
}

/// A routing request
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Roles the serving node must support; empty matches any node
    pub required_roles: Vec<NodeRole>,
}

/// Load-aware router over cached registry state
///
/// `route` is synchronous and bounded: it reads a snapshot and the live
/// connection counters, never probing.
pub struct LoadBalancer {
    registry: Arc<NodeRegistry>,
    config: BalancerConfig,
    connections: DashMap<NodeId, Arc<AtomicU32>>,
    deprioritized: RwLock<HashSet<NodeId>>,
}

impl LoadBalancer {
    /// Create a balancer with default thresholds
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_config(registry, BalancerConfig::default())
    }

    /// Create a balancer with custom thresholds
    pub fn with_config(registry: Arc<NodeRegistry>, config: BalancerConfig) -> Self {
        Self {
            registry,
            config,
            connections: DashMap::new(),
            deprioritized: RwLock::new(HashSet::new()),
        }
    }

    /// Balancer configuration
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Current load ratio for a node (active connections / capacity)
    pub fn load_ratio(&self, node: &MeshNode) -> f64 {
        let active = self
            .connections
            .get(&node.id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0);
        let capacity = node.capabilities.max_connections.max(1);
        active as f64 / capacity as f64
    }

    /// Route a request to a node, counting one connection against it
    ///
    /// Only Active nodes are eligible. A node at or over the overload
    /// threshold is never picked while an under-threshold node exists;
    /// recovering nodes in the hysteresis band lose a bounded fraction
    /// of decisions. Zero eligible nodes is an error for this request,
    /// surfaced for graceful degradation, never silently dropped.
    pub fn route(&self, request: &RouteRequest) -> MeshResult<Arc<MeshNode>> {
        let eligible: Vec<Arc<MeshNode>> = self.registry.list(|node| {
            node.health.is_routable()
                && (request.required_roles.is_empty()
                    || node.capabilities.match_fraction(&request.required_roles) >= 1.0)
        });

        if eligible.is_empty() {
            return Err(MeshError::NoAvailableNode);
        }

        let loads: Vec<(Arc<MeshNode>, f64)> = eligible
            .iter()
            .map(|node| (Arc::clone(node), self.load_ratio(node)))
            .collect();

        // Reactive pass: a node crossing the threshold between scheduled
        // rebalances is deprioritized immediately.
        for (node, ratio) in &loads {
            if *ratio >= self.config.overload_enter
                && !self.deprioritized.read().contains(&node.id)
            {
                self.rebalance();
                break;
            }
        }

        let under_threshold: Vec<&(Arc<MeshNode>, f64)> = loads
            .iter()
            .filter(|(_, ratio)| *ratio < self.config.overload_enter)
            .collect();

        // All nodes saturated: degrade to least-loaded rather than failing
        let candidates: Vec<&(Arc<MeshNode>, f64)> = if under_threshold.is_empty() {
            loads.iter().collect()
        } else {
            under_threshold
        };

        let mut rng = rand::thread_rng();

        // Steer a bounded fraction of decisions away from nodes still
        // recovering inside the hysteresis band.
        let recovering = self.deprioritized.read();
        let preferred: Vec<&&(Arc<MeshNode>, f64)> = candidates
            .iter()
            .filter(|(node, _)| !recovering.contains(&node.id))
            .collect();
        let steer_away =
            !preferred.is_empty() && rng.gen::<f64>() < self.config.redirect_fraction;

        let pool: Vec<&(Arc<MeshNode>, f64)> = if steer_away {
            preferred.into_iter().copied().collect()
        } else {
            candidates
        };
        drop(recovering);

        // One jitter roll per candidate so the ordering is consistent
        // within this pick
        let picked = pool
            .into_iter()
            .map(|(node, ratio)| {
                let jitter = rng.gen_range(0.0..=self.config.jitter.max(f64::MIN_POSITIVE));
                (node, ratio + jitter)
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(node, _)| Arc::clone(node))
            .ok_or(MeshError::NoAvailableNode)?;

        self.checkout(&picked.id);
        debug!(node = %picked.id, "request routed");
        Ok(picked)
    }

    /// Count a connection against a node
    pub fn checkout(&self, id: &NodeId) {
        self.connections
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Release a connection from a node
    pub fn release(&self, id: &NodeId) {
        if let Some(counter) = self.connections.get(id) {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                c.checked_sub(1)
            });
        }
    }

    /// Recompute the deprioritized set from current load ratios
    ///
    /// Enter at `overload_enter`, leave below `overload_exit`; a node in
    /// between keeps its current state. Returns the number of set
    /// changes, so a stable distribution yields zero.
    pub fn rebalance(&self) -> usize {
        let nodes = self.registry.snapshot();
        let mut changes = 0;
        let mut set = self.deprioritized.write();

        for node in &nodes {
            let ratio = self.load_ratio(node);
            if ratio >= self.config.overload_enter {
                if set.insert(node.id.clone()) {
                    warn!(node = %node.id, ratio, "node overloaded, deprioritizing");
                    changes += 1;
                }
            } else if ratio <= self.config.overload_exit && set.remove(&node.id) {
                info!(node = %node.id, ratio, "node recovered, back in rotation");
                changes += 1;
            }
        }

        // Forget nodes that left the registry snapshot entirely
        set.retain(|id| nodes.iter().any(|n| &n.id == id));
        changes
    }

    /// Whether a node is currently deprioritized
    pub fn is_deprioritized(&self, id: &NodeId) -> bool {
        self.deprioritized.read().contains(id)
    }
}

/// Periodic rebalance worker, off the request path
pub struct RebalanceWorker {
    balancer: Arc<LoadBalancer>,
}

impl RebalanceWorker {
    /// Create a worker for the given balancer
    pub fn new(balancer: Arc<LoadBalancer>) -> Self {
        Self { balancer }
    }

    /// One rebalance pass
    pub fn tick(&self) -> usize {
        self.balancer.rebalance()
    }

    /// Run the fixed-interval loop; cancel by dropping the task
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.balancer.config.rebalance_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let changes = self.tick();
            if changes > 0 {
                debug!(changes, "rebalance pass applied changes");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mesh_registry::{MeshNode, NodeCapabilities};
    use mesh_telemetry::{NetworkMetrics, Sample};

    fn metrics(latency: f64, cpu: f64, memory: f64) -> NetworkMetrics {
        NetworkMetrics {
            latency_ms: latency,
            bandwidth_mbps: 80.0,
            packet_loss_pct: 0.3,
            uptime_pct: 99.5,
            cpu_load_pct: cpu,
            memory_load_pct: memory,
        }
    }

    fn add_active_node(registry: &NodeRegistry, id: &str, max_connections: u32) {
        registry.register(
            MeshNode::new(id, "10.0.0.1", 7700).with_capabilities(NodeCapabilities {
                max_connections,
                ..Default::default()
            }),
        );
        registry.update_metrics(
            &id.into(),
            Utc::now(),
            &Sample {
                metrics: metrics(20.0, 15.0, 30.0),
                reachable: true,
            },
        );
    }

    #[test]
    fn test_route_with_no_nodes_errors() {
        let registry = Arc::new(NodeRegistry::new());
        let balancer = LoadBalancer::new(registry);
        let err = balancer.route(&RouteRequest::default()).unwrap_err();
        assert!(matches!(err, MeshError::NoAvailableNode));
    }

    #[test]
    fn test_route_excludes_unreachable_and_degraded() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "up", 100);
        add_active_node(&registry, "down", 100);
        registry.mark_unreachable(&"down".into());

        // Degrade a third node through ten strained samples
        add_active_node(&registry, "strained", 100);
        for _ in 0..10 {
            registry.update_metrics(
                &"strained".into(),
                Utc::now(),
                &Sample {
                    metrics: metrics(500.0, 95.0, 90.0),
                    reachable: true,
                },
            );
        }

        let balancer = LoadBalancer::new(registry);
        for _ in 0..20 {
            let node = balancer.route(&RouteRequest::default()).unwrap();
            assert_eq!(node.id.as_str(), "up");
        }
    }

    #[test]
    fn test_route_never_picks_overloaded_while_alternative_exists() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "busy", 10);
        add_active_node(&registry, "idle", 10);

        let balancer = LoadBalancer::new(registry);
        // Push "busy" to 90% load
        for _ in 0..9 {
            balancer.checkout(&"busy".into());
        }

        for _ in 0..50 {
            let node = balancer.route(&RouteRequest::default()).unwrap();
            assert_eq!(node.id.as_str(), "idle");
            balancer.release(&node.id);
        }
    }

    #[test]
    fn test_route_degrades_to_least_loaded_when_all_saturated() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "a", 10);
        add_active_node(&registry, "b", 10);

        let balancer = LoadBalancer::new(registry);
        for _ in 0..9 {
            balancer.checkout(&"a".into());
        }
        for _ in 0..10 {
            balancer.checkout(&"b".into());
        }

        let node = balancer.route(&RouteRequest::default()).unwrap();
        assert_eq!(node.id.as_str(), "a");
    }

    #[test]
    fn test_jitter_spreads_picks_across_equal_nodes() {
        let registry = Arc::new(NodeRegistry::new());
        for id in ["a", "b", "c"] {
            add_active_node(&registry, id, 100);
        }

        let balancer = LoadBalancer::new(registry);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let node = balancer.route(&RouteRequest::default()).unwrap();
            seen.insert(node.id.clone());
            balancer.release(&node.id);
        }
        assert!(seen.len() > 1, "jitter should break the herd");
    }

    #[test]
    fn test_jitter_never_outweighs_a_clear_load_gap() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "loaded", 10);
        add_active_node(&registry, "idle", 10);

        let balancer = LoadBalancer::new(registry);
        // 50% load: well under the overload threshold but far beyond the
        // 0.05 jitter span
        for _ in 0..5 {
            balancer.checkout(&"loaded".into());
        }

        for _ in 0..50 {
            let node = balancer.route(&RouteRequest::default()).unwrap();
            assert_eq!(node.id.as_str(), "idle");
            balancer.release(&node.id);
        }
    }

    #[test]
    fn test_rebalance_idempotent_at_steady_state() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "a", 10);
        add_active_node(&registry, "b", 10);

        let balancer = LoadBalancer::new(registry);
        for _ in 0..9 {
            balancer.checkout(&"a".into());
        }

        let first = balancer.rebalance();
        assert_eq!(first, 1);
        assert!(balancer.is_deprioritized(&"a".into()));

        // Stable distribution: no further changes
        assert_eq!(balancer.rebalance(), 0);
        assert_eq!(balancer.rebalance(), 0);
    }

    #[test]
    fn test_hysteresis_band_holds_state() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "a", 100);

        let balancer = LoadBalancer::new(registry);
        for _ in 0..90 {
            balancer.checkout(&"a".into());
        }
        balancer.rebalance();
        assert!(balancer.is_deprioritized(&"a".into()));

        // Drop to 75%: inside the band, stays deprioritized
        for _ in 0..15 {
            balancer.release(&"a".into());
        }
        balancer.rebalance();
        assert!(balancer.is_deprioritized(&"a".into()));

        // Below the 70% exit threshold: rejoins rotation
        for _ in 0..10 {
            balancer.release(&"a".into());
        }
        balancer.rebalance();
        assert!(!balancer.is_deprioritized(&"a".into()));
    }

    #[test]
    fn test_role_filtered_routing() {
        let registry = Arc::new(NodeRegistry::new());
        add_active_node(&registry, "relay", 100);
        registry.register(
            MeshNode::new("store", "10.0.0.2", 7700).with_capabilities(NodeCapabilities {
                roles: vec![NodeRole::Storage],
                ..Default::default()
            }),
        );
        registry.update_metrics(
            &"store".into(),
            Utc::now(),
            &Sample {
                metrics: metrics(20.0, 15.0, 30.0),
                reachable: true,
            },
        );

        let balancer = LoadBalancer::new(registry);
        let request = RouteRequest {
            required_roles: vec![NodeRole::Storage],
        };
        for _ in 0..10 {
            let node = balancer.route(&request).unwrap();
            assert_eq!(node.id.as_str(), "store");
            balancer.release(&node.id);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(BalancerConfig::default().validate().is_ok());

        let mut inverted = BalancerConfig::default();
        inverted.overload_exit = 0.9;
        assert!(inverted.validate().is_err());
    }
}
