//! Node model

use chrono::{DateTime, Utc};
use mesh_common::{NodeHealth, NodeId, NodeRole};
use mesh_geo::GeoLocation;
use mesh_telemetry::NetworkMetrics;
use serde::{Deserialize, Serialize};

/// Capabilities a node advertises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// Roles the node can serve
    pub roles: Vec<NodeRole>,
    /// Maximum concurrent connections the node accepts
    pub max_connections: u32,
    /// Advertised bandwidth ceiling in Mbps
    pub bandwidth_ceiling_mbps: f64,
}

impl Default for NodeCapabilities {
    fn default() -> Self {
        Self {
            roles: vec![NodeRole::Relay],
            max_connections: 100,
            bandwidth_ceiling_mbps: 100.0,
        }
    }
}

impl NodeCapabilities {
    /// Fraction of required roles this node supports, in [0,1]
    ///
    /// An empty requirement matches fully.
    pub fn match_fraction(&self, required: &[NodeRole]) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        let supported = required
            .iter()
            .filter(|role| self.roles.contains(role))
            .count();
        supported as f64 / required.len() as f64
    }
}

/// A known mesh participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshNode {
    /// Opaque identifier
    pub id: NodeId,
    /// Reachable address
    pub address: String,
    /// Port
    pub port: u16,
    /// Resolved location; `None` until resolution succeeds
    pub location: Option<GeoLocation>,
    /// Latest metrics
    pub metrics: NetworkMetrics,
    /// Advertised capabilities
    pub capabilities: NodeCapabilities,
    /// Trust weight in [0,1]; defaults to 1.0 (trust-by-default)
    pub trust_score: f64,
    /// Last heartbeat or successful sample
    pub last_seen: DateTime<Utc>,
    /// Health state
    pub health: NodeHealth,
}

impl MeshNode {
    /// Create a node on first registration
    ///
    /// Metrics start pessimistic (no measured uptime or bandwidth) so an
    /// unprobed node cannot outrank a measured one.
    pub fn new(id: impl Into<NodeId>, address: &str, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.to_string(),
            port,
            location: None,
            metrics: initial_metrics(),
            capabilities: NodeCapabilities::default(),
            trust_score: 1.0,
            last_seen: Utc::now(),
            health: NodeHealth::Active,
        }
    }

    /// Attach a resolved location
    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Replace advertised capabilities
    pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the trust score, clamped to [0,1]
    pub fn with_trust(mut self, trust: f64) -> Self {
        self.trust_score = trust.clamp(0.0, 1.0);
        self
    }

    /// Region label for diversity grouping
    pub fn region_label(&self) -> &str {
        self.location
            .as_ref()
            .map(|l| l.region_label())
            .unwrap_or("unknown")
    }
}

fn initial_metrics() -> NetworkMetrics {
    NetworkMetrics {
        latency_ms: 10_000.0,
        bandwidth_mbps: 0.0,
        packet_loss_pct: 0.0,
        uptime_pct: 0.0,
        cpu_load_pct: 0.0,
        memory_load_pct: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_telemetry::QualityWeights;

    #[test]
    fn test_trust_defaults_to_max() {
        let node = MeshNode::new("n1", "10.0.0.1", 7700);
        assert_eq!(node.trust_score, 1.0);
    }

    #[test]
    fn test_trust_clamped() {
        let node = MeshNode::new("n1", "10.0.0.1", 7700).with_trust(1.8);
        assert_eq!(node.trust_score, 1.0);
    }

    #[test]
    fn test_unprobed_node_scores_low() {
        let node = MeshNode::new("n1", "10.0.0.1", 7700);
        let quality = node.metrics.quality_score(&QualityWeights::default());
        assert!(quality < 0.5, "quality was {quality}");
    }

    #[test]
    fn test_capability_match() {
        use mesh_common::NodeRole::*;
        let caps = NodeCapabilities {
            roles: vec![Relay, Storage],
            ..Default::default()
        };
        assert_eq!(caps.match_fraction(&[]), 1.0);
        assert_eq!(caps.match_fraction(&[Relay]), 1.0);
        assert_eq!(caps.match_fraction(&[Relay, Compute]), 0.5);
        assert_eq!(caps.match_fraction(&[Compute]), 0.0);
    }

    #[test]
    fn test_region_label_falls_back() {
        let node = MeshNode::new("n1", "10.0.0.1", 7700);
        assert_eq!(node.region_label(), "unknown");

        let located = node.with_location(GeoLocation::new(52.5, 13.4).with_region("eu-central"));
        assert_eq!(located.region_label(), "eu-central");
    }
}
