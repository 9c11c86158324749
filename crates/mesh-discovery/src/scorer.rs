//! Weighted candidate scoring

use mesh_common::{clamp_unit, MeshError, MeshResult, NodeRole};
use mesh_geo::{distance_km, proximity_score};
use mesh_registry::MeshNode;
use mesh_telemetry::QualityWeights;
use serde::{Deserialize, Serialize};

/// Distance at which proximity scores 0.5
pub const DEFAULT_PROXIMITY_HALF_KM: f64 = 2000.0;

/// Composite score for one candidate (derived, never persisted)
#[derive(Debug, Clone, Copy)]
pub struct CandidateScore {
    /// Weighted total in [0,1]
    pub total: f64,
    /// Quality component
    pub quality: f64,
    /// Proximity component (0.5 when either location is unknown)
    pub proximity: f64,
    /// Trust component
    pub trust: f64,
    /// Capability-match component
    pub capability: f64,
    /// Uptime component
    pub uptime: f64,
}

/// Candidate scoring weights
///
/// Defaults are the documented 40/20/20/10/10 split; they are operating
/// defaults exposed through configuration, not derived constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight on composite quality
    pub quality: f64,
    /// Weight on geographic proximity
    pub proximity: f64,
    /// Weight on trust score
    pub trust: f64,
    /// Weight on capability match
    pub capability: f64,
    /// Weight on uptime
    pub uptime: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            quality: 0.4,
            proximity: 0.2,
            trust: 0.2,
            capability: 0.1,
            uptime: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Validate that the weights form a convex combination
    pub fn validate(&self) -> MeshResult<()> {
        let parts = [
            self.quality,
            self.proximity,
            self.trust,
            self.capability,
            self.uptime,
        ];
        if parts.iter().any(|w| *w < 0.0) {
            return Err(MeshError::Configuration(
                "scoring weights must be non-negative".into(),
            ));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(MeshError::Configuration(format!(
                "scoring weights sum to {sum:.3}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// Scores candidates relative to a local node
#[derive(Debug, Clone)]
pub struct NodeScorer {
    weights: ScoringWeights,
    quality_weights: QualityWeights,
    proximity_half_km: f64,
}

impl NodeScorer {
    /// Create a scorer with the given weights
    pub fn new(weights: ScoringWeights, quality_weights: QualityWeights) -> Self {
        Self {
            weights,
            quality_weights,
            proximity_half_km: DEFAULT_PROXIMITY_HALF_KM,
        }
    }

    /// Override the proximity half-distance
    pub fn with_proximity_half_km(mut self, half_km: f64) -> Self {
        self.proximity_half_km = half_km;
        self
    }

    /// Score a candidate against the local node
    pub fn score(
        &self,
        local: &MeshNode,
        candidate: &MeshNode,
        required_roles: &[NodeRole],
    ) -> CandidateScore {
        let quality = candidate.metrics.quality_score(&self.quality_weights);
        let proximity = self.proximity(local, candidate);
        let trust = clamp_unit(candidate.trust_score);
        let capability = candidate.capabilities.match_fraction(required_roles);
        let uptime = (candidate.metrics.uptime_pct / 100.0).clamp(0.0, 1.0);

        let total = clamp_unit(
            self.weights.quality * quality
                + self.weights.proximity * proximity
                + self.weights.trust * trust
                + self.weights.capability * capability
                + self.weights.uptime * uptime,
        );

        CandidateScore {
            total,
            quality,
            proximity,
            trust,
            capability,
            uptime,
        }
    }

    /// Proximity component; neutral when either side has no usable
    /// location, so unresolved nodes are neither favored nor punished
    fn proximity(&self, local: &MeshNode, candidate: &MeshNode) -> f64 {
        match (&local.location, &candidate.location) {
            (Some(a), Some(b)) if !a.is_unknown() && !b.is_unknown() => {
                proximity_score(distance_km(a, b), self.proximity_half_km)
            }
            _ => 0.5,
        }
    }
}

impl Default for NodeScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), QualityWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_geo::GeoLocation;
    use mesh_telemetry::NetworkMetrics;

    fn node(id: &str, location: Option<GeoLocation>) -> MeshNode {
        let mut node = MeshNode::new(id, "10.0.0.1", 7700);
        node.location = location;
        node.metrics = NetworkMetrics {
            latency_ms: 30.0,
            bandwidth_mbps: 80.0,
            packet_loss_pct: 0.5,
            uptime_pct: 99.0,
            cpu_load_pct: 25.0,
            memory_load_pct: 40.0,
        };
        node
    }

    #[test]
    fn test_score_in_unit_interval() {
        let scorer = NodeScorer::default();
        let local = node("local", Some(GeoLocation::new(40.7, -74.0)));
        let candidate = node("far", Some(GeoLocation::new(-33.9, 151.2)));
        let score = scorer.score(&local, &candidate, &[]);
        assert!((0.0..=1.0).contains(&score.total));
    }

    #[test]
    fn test_nearer_candidate_outranks_equal_peer() {
        let scorer = NodeScorer::default();
        let local = node("local", Some(GeoLocation::new(40.7, -74.0)));
        let near = node("near", Some(GeoLocation::new(41.0, -73.0)));
        let far = node("far", Some(GeoLocation::new(-33.9, 151.2)));

        let near_score = scorer.score(&local, &near, &[]);
        let far_score = scorer.score(&local, &far, &[]);
        assert!(near_score.total > far_score.total);
    }

    #[test]
    fn test_unknown_location_is_neutral() {
        let scorer = NodeScorer::default();
        let local = node("local", Some(GeoLocation::new(40.7, -74.0)));
        let unknown = node("unknown", None);
        let sentinel = node("sentinel", Some(GeoLocation::unknown()));

        assert_eq!(scorer.score(&local, &unknown, &[]).proximity, 0.5);
        assert_eq!(scorer.score(&local, &sentinel, &[]).proximity, 0.5);
    }

    #[test]
    fn test_trust_weighs_in() {
        let scorer = NodeScorer::default();
        let local = node("local", None);
        let trusted = node("trusted", None);
        let mut doubted = node("doubted", None);
        doubted.trust_score = 0.2;

        let trusted_score = scorer.score(&local, &trusted, &[]);
        let doubted_score = scorer.score(&local, &doubted, &[]);
        assert!(trusted_score.total > doubted_score.total);
    }

    #[test]
    fn test_weight_validation() {
        assert!(ScoringWeights::default().validate().is_ok());
        let bad = ScoringWeights {
            quality: 0.9,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
