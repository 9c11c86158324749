//! Metrics model and weighted quality scoring

use mesh_common::clamp_unit;
use serde::{Deserialize, Serialize};

/// Point-in-time network metrics for a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Measured throughput in Mbps
    pub bandwidth_mbps: f64,
    /// Packet loss percentage (0-100)
    pub packet_loss_pct: f64,
    /// Uptime percentage (0-100)
    pub uptime_pct: f64,
    /// CPU load percentage (0-100)
    pub cpu_load_pct: f64,
    /// Memory load percentage (0-100)
    pub memory_load_pct: f64,
}

impl NetworkMetrics {
    /// Sample recorded when a probe times out or fails
    ///
    /// Latency is pinned at the probe deadline so the sample still sorts
    /// behind every reachable node.
    pub fn unreachable(deadline_ms: f64) -> Self {
        Self {
            latency_ms: deadline_ms,
            bandwidth_mbps: 0.0,
            packet_loss_pct: 100.0,
            uptime_pct: 0.0,
            cpu_load_pct: 0.0,
            memory_load_pct: 0.0,
        }
    }

    /// Composite quality score in [0,1]
    ///
    /// `w_lat·norm(latency) + w_bw·norm(bandwidth) + w_loss·(1−loss) +
    /// w_up·uptime − penalty·load`, clamped to the unit interval. The
    /// load term uses the hotter of CPU and memory.
    pub fn quality_score(&self, weights: &QualityWeights) -> f64 {
        let latency_score = normalize_lower_better(self.latency_ms, weights.max_latency_ms);
        let bandwidth_score =
            normalize_higher_better(self.bandwidth_mbps, weights.target_bandwidth_mbps);
        let loss_score = 1.0 - (self.packet_loss_pct / 100.0).clamp(0.0, 1.0);
        let uptime_score = (self.uptime_pct / 100.0).clamp(0.0, 1.0);

        let load = self.cpu_load_pct.max(self.memory_load_pct) / 100.0;
        let load_penalty = weights.load_penalty * load.clamp(0.0, 1.0);

        clamp_unit(
            weights.latency * latency_score
                + weights.bandwidth * bandwidth_score
                + weights.loss * loss_score
                + weights.uptime * uptime_score
                - load_penalty,
        )
    }
}

/// Quality-score weights
///
/// The four positive weights must sum to 1; `load_penalty` is subtracted
/// separately, scaled by the hotter of CPU and memory load. Defaults are
/// documented operating values, not derived constants; override via
/// configuration when the deployment calls for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityWeights {
    /// Latency weight
    pub latency: f64,
    /// Bandwidth weight
    pub bandwidth: f64,
    /// Packet-loss weight
    pub loss: f64,
    /// Uptime weight
    pub uptime: f64,
    /// Penalty factor applied to host load
    pub load_penalty: f64,
    /// Latency at or above which the latency score is zero
    pub max_latency_ms: f64,
    /// Bandwidth at which the bandwidth score saturates at 1.0
    pub target_bandwidth_mbps: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            latency: 0.3,
            bandwidth: 0.25,
            loss: 0.25,
            uptime: 0.2,
            load_penalty: 0.25,
            max_latency_ms: 1000.0,
            target_bandwidth_mbps: 100.0,
        }
    }
}

impl QualityWeights {
    /// Validate weight invariants; fatal at startup when violated
    pub fn validate(&self) -> Result<(), mesh_common::MeshError> {
        let sum = self.latency + self.bandwidth + self.loss + self.uptime;
        if (sum - 1.0).abs() > 0.01 {
            return Err(mesh_common::MeshError::Configuration(format!(
                "quality weights sum to {sum:.3}, expected 1.0"
            )));
        }
        if [self.latency, self.bandwidth, self.loss, self.uptime, self.load_penalty]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(mesh_common::MeshError::Configuration(
                "quality weights must be non-negative".into(),
            ));
        }
        if self.max_latency_ms <= 0.0 || self.target_bandwidth_mbps <= 0.0 {
            return Err(mesh_common::MeshError::Configuration(
                "quality normalization ceilings must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Normalize where lower is better
#[inline(always)]
fn normalize_lower_better(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 1.0;
    }
    (1.0 - value / max).max(0.0)
}

/// Normalize where higher is better
#[inline(always)]
fn normalize_higher_better(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 1.0;
    }
    (value / target).min(1.0)
}
