//! Node scoring and discovery
//!
//! Ranks candidate peers on a weighted composite of quality, proximity,
//! trust, capability fit, and uptime, then selects a result set that
//! spans geographic regions without sacrificing quality when the pool
//! cannot satisfy the diversity quota.

#![warn(missing_docs)]

pub mod scorer;

pub use scorer::{CandidateScore, NodeScorer, ScoringWeights};

use mesh_common::{NodeHealth, NodeId, NodeRole};
use mesh_registry::{MeshNode, NodeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Minimum quality for bootstrap recommendations
pub const DEFAULT_BOOTSTRAP_MIN_QUALITY: f64 = 0.5;

/// Entry handed to the membership/join layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRecommendation {
    /// Node id
    pub node_id: NodeId,
    /// Reachable address
    pub address: String,
    /// Port
    pub port: u16,
    /// Region label
    pub region: String,
    /// Composite quality score
    pub quality: f64,
}

/// Discovery engine over cached registry state
///
/// `discover` and `bootstrap_candidates` are synchronous and bounded:
/// they read a point-in-time snapshot and never block on live probes.
pub struct DiscoveryEngine {
    registry: Arc<NodeRegistry>,
    scorer: NodeScorer,
}

impl DiscoveryEngine {
    /// Create an engine with default scoring weights
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            scorer: NodeScorer::default(),
        }
    }

    /// Replace the scorer
    pub fn with_scorer(mut self, scorer: NodeScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Select up to `max_results` peers for `local`, spanning at least
    /// `diversity_min` regions when the pool allows
    ///
    /// Candidates are scored and sorted (score desc, latency asc, id asc
    /// for determinism), then taken greedily: after the top pick, a
    /// candidate is only taken early if it adds an unrepresented region
    /// or the diversity quota is already met. Remaining slots are filled
    /// by score so a shallow pool never pads with worse nodes than it
    /// has. An empty pool yields an empty vec, not an error.
    pub fn discover(
        &self,
        local: &MeshNode,
        max_results: usize,
        diversity_min: usize,
    ) -> Vec<Arc<MeshNode>> {
        let pool = self.registry.list(|node| {
            node.id != local.id && node.health.is_scorable()
        });
        self.select(local, pool, max_results, diversity_min, &[])
    }

    /// Discover among nodes serving the given roles
    pub fn discover_with_roles(
        &self,
        local: &MeshNode,
        max_results: usize,
        diversity_min: usize,
        required_roles: &[NodeRole],
    ) -> Vec<Arc<MeshNode>> {
        let pool = self.registry.list(|node| {
            node.id != local.id && node.health.is_scorable()
        });
        self.select(local, pool, max_results, diversity_min, required_roles)
    }

    /// Ranked entry points for a node joining the mesh
    ///
    /// Stricter than `discover`: only Active nodes at or above the
    /// quality floor qualify. Returns fewer than requested rather than
    /// padding with poor nodes; empty is a valid result.
    pub fn bootstrap_candidates(
        &self,
        local: &MeshNode,
        max_results: usize,
        diversity_min: usize,
        min_quality: f64,
    ) -> Vec<BootstrapRecommendation> {
        let quality_weights = self.registry.config().quality;
        let pool = self.registry.list(|node| {
            node.id != local.id
                && node.health == NodeHealth::Active
                && node.metrics.quality_score(&quality_weights) >= min_quality
        });

        self.select(local, pool, max_results, diversity_min, &[NodeRole::Bootstrap])
            .into_iter()
            .map(|node| BootstrapRecommendation {
                node_id: node.id.clone(),
                address: node.address.clone(),
                port: node.port,
                region: node.region_label().to_string(),
                quality: node.metrics.quality_score(&quality_weights),
            })
            .collect()
    }

    fn select(
        &self,
        local: &MeshNode,
        pool: Vec<Arc<MeshNode>>,
        max_results: usize,
        diversity_min: usize,
        required_roles: &[NodeRole],
    ) -> Vec<Arc<MeshNode>> {
        if max_results == 0 || pool.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(Arc<MeshNode>, CandidateScore)> = pool
            .into_iter()
            .map(|node| {
                let score = self.scorer.score(local, &node, required_roles);
                (node, score)
            })
            .collect();

        // Deterministic order: score desc, then latency asc, then id asc
        ranked.sort_by(|a, b| {
            b.1.total
                .partial_cmp(&a.1.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.0.metrics
                        .latency_ms
                        .partial_cmp(&b.0.metrics.latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.0.id.cmp(&b.0.id))
        });

        let mut selected: Vec<Arc<MeshNode>> = Vec::with_capacity(max_results);
        let mut regions: HashSet<String> = HashSet::new();
        let mut skipped: Vec<Arc<MeshNode>> = Vec::new();

        for (node, score) in ranked {
            if selected.len() >= max_results {
                break;
            }
            let region = node.region_label().to_string();
            let quota_met = regions.len() >= diversity_min;
            if selected.is_empty() || quota_met || !regions.contains(&region) {
                debug!(node = %node.id, total = score.total, region, "candidate selected");
                regions.insert(region);
                selected.push(node);
            } else {
                skipped.push(node);
            }
        }

        // The pool could not satisfy diversity within max_results; fill
        // remaining slots with the best skipped candidates.
        for node in skipped {
            if selected.len() >= max_results {
                break;
            }
            selected.push(node);
        }

        selected
    }
}
