//! Forecast-driven capacity adjustment
//!
//! Closes the loop from predicted load to advertised capacity: each pass
//! forecasts a node's CPU load at the horizon, turns the predicted shift
//! into a connection-limit delta per the configured strategy, and applies
//! it through the registry. Deltas below the significance floor are
//! suppressed so capacity does not flap on noise.

use crate::predict::CapacityPredictor;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_common::{MeshError, MeshResult, MetricKind, NodeHealth, NodeId};
use mesh_registry::NodeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Adjustments retained per node for oscillation damping
const ADJUSTMENT_HISTORY: usize = 10;

/// How a predicted load shift maps to a capacity delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentStrategy {
    /// Half the predicted shift, clamped to the per-pass step limit
    Conservative,
    /// The full predicted shift
    Aggressive,
    /// The predicted shift scaled by forecast confidence
    Predictive,
    /// Predictive, halved while recent adjustments alternate direction
    Hybrid,
}

impl AdjustmentStrategy {
    /// Turn a predicted load shift (percent) into a capacity delta
    pub fn compute_delta(
        &self,
        predicted_shift_pct: f64,
        confidence: f64,
        max_step_pct: f64,
        recent: &[CapacityAdjustment],
    ) -> f64 {
        match self {
            Self::Conservative => {
                (predicted_shift_pct * 0.5).clamp(-max_step_pct, max_step_pct)
            }
            Self::Aggressive => predicted_shift_pct,
            Self::Predictive => predicted_shift_pct * confidence,
            Self::Hybrid => {
                let base = predicted_shift_pct * confidence;
                if oscillating(recent) {
                    base * 0.5
                } else {
                    base
                }
            }
        }
    }
}

/// True when the last few adjustments keep flipping sign
fn oscillating(recent: &[CapacityAdjustment]) -> bool {
    if recent.len() < 2 {
        return false;
    }
    recent
        .windows(2)
        .rev()
        .take(3)
        .all(|pair| pair[0].delta_pct.signum() != pair[1].delta_pct.signum())
}

/// One applied capacity change, kept for audit and damping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityAdjustment {
    /// Unique adjustment id
    pub id: Uuid,
    /// Node the adjustment applies to
    pub node_id: NodeId,
    /// Connection limit before the change
    pub previous_max: u32,
    /// Connection limit after the change
    pub new_max: u32,
    /// Applied delta as a percentage of the previous limit
    pub delta_pct: f64,
    /// Strategy that produced the delta
    pub strategy: AdjustmentStrategy,
    /// Forecast confidence behind the delta
    pub confidence: f64,
    /// When the adjustment was applied
    pub timestamp: DateTime<Utc>,
}

/// Capacity-manager tuning
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// Floor for the advertised connection limit
    pub min_connections: u32,
    /// Ceiling for the advertised connection limit
    pub max_connections: u32,
    /// Deltas smaller than this (percent) are suppressed
    pub significance_pct: f64,
    /// Per-pass step limit for the Conservative strategy (percent)
    pub max_step_pct: f64,
    /// Strategy in effect
    pub strategy: AdjustmentStrategy,
    /// Forecast horizon
    pub horizon: Duration,
    /// Pass interval for the background worker
    pub evaluation_interval: Duration,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            min_connections: 10,
            max_connections: 10_000,
            significance_pct: 5.0,
            max_step_pct: 10.0,
            strategy: AdjustmentStrategy::Hybrid,
            horizon: Duration::from_secs(3600),
            evaluation_interval: Duration::from_secs(300),
        }
    }
}

impl CapacityConfig {
    /// Validate configuration; fatal at startup when violated
    pub fn validate(&self) -> MeshResult<()> {
        if self.min_connections == 0 || self.min_connections > self.max_connections {
            return Err(MeshError::Configuration(
                "capacity bounds must satisfy 0 < min <= max".into(),
            ));
        }
        if self.significance_pct < 0.0 {
            return Err(MeshError::Configuration(
                "significance_pct must be non-negative".into(),
            ));
        }
        if self.max_step_pct <= 0.0 {
            return Err(MeshError::Configuration(
                "max_step_pct must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Turns load forecasts into bounded connection-limit changes
pub struct AdaptiveCapacityManager {
    registry: Arc<NodeRegistry>,
    predictor: CapacityPredictor,
    config: CapacityConfig,
    applied: DashMap<NodeId, VecDeque<CapacityAdjustment>>,
}

impl AdaptiveCapacityManager {
    /// Create a manager over the given registry
    pub fn new(registry: Arc<NodeRegistry>, config: CapacityConfig) -> Self {
        Self {
            registry,
            predictor: CapacityPredictor::new(),
            config,
            applied: DashMap::new(),
        }
    }

    /// Replace the default predictor
    pub fn with_predictor(mut self, predictor: CapacityPredictor) -> Self {
        self.predictor = predictor;
        self
    }

    /// Plan an adjustment for one node without applying it
    ///
    /// Returns `None` when the node is unknown, the forecast is too
    /// uncertain to act on, or the resulting delta is insignificant.
    pub fn plan(&self, id: &NodeId) -> Option<CapacityAdjustment> {
        let node = self.registry.get(id)?;
        let samples = self.registry.samples(id, MetricKind::CpuLoad);
        if samples.is_empty() {
            return None;
        }

        let estimate = self.predictor.predict(&samples, self.config.horizon);
        if estimate.confidence <= f64::EPSILON {
            return None;
        }

        // Shift relative to the current load level; a flat forecast
        // produces no shift and therefore no adjustment
        let current = node.metrics.cpu_load_pct.max(1.0);
        let shift_pct = (estimate.value - current) / current * 100.0;

        let recent = self.recent_adjustments(id);
        let delta_pct = self.config.strategy.compute_delta(
            shift_pct,
            estimate.confidence,
            self.config.max_step_pct,
            &recent,
        );
        if delta_pct.abs() < self.config.significance_pct {
            debug!(node = %id, delta_pct, "adjustment below significance floor");
            return None;
        }

        let previous_max = node.capabilities.max_connections;
        let scaled = previous_max as f64 * (1.0 + delta_pct / 100.0);
        let new_max = (scaled.round() as i64)
            .clamp(self.config.min_connections as i64, self.config.max_connections as i64)
            as u32;
        if new_max == previous_max {
            return None;
        }

        Some(CapacityAdjustment {
            id: Uuid::new_v4(),
            node_id: id.clone(),
            previous_max,
            new_max,
            delta_pct,
            strategy: self.config.strategy,
            confidence: estimate.confidence,
            timestamp: Utc::now(),
        })
    }

    /// Apply a planned adjustment through the registry
    ///
    /// Returns false when the node has vanished since planning.
    pub fn apply(&self, adjustment: CapacityAdjustment) -> bool {
        let Some(node) = self.registry.get(&adjustment.node_id) else {
            warn!(node = %adjustment.node_id, "node vanished before adjustment applied");
            return false;
        };
        let mut capabilities = node.capabilities.clone();
        capabilities.max_connections = adjustment.new_max;
        if !self
            .registry
            .update_capabilities(&adjustment.node_id, capabilities)
        {
            return false;
        }

        info!(
            node = %adjustment.node_id,
            from = adjustment.previous_max,
            to = adjustment.new_max,
            strategy = ?adjustment.strategy,
            "capacity adjusted"
        );

        let mut history = self
            .applied
            .entry(adjustment.node_id.clone())
            .or_default();
        if history.len() >= ADJUSTMENT_HISTORY {
            history.pop_front();
        }
        history.push_back(adjustment);
        true
    }

    /// Evaluate every scorable node, applying significant adjustments
    ///
    /// Returns the adjustments applied this pass.
    pub fn run_once(&self) -> Vec<CapacityAdjustment> {
        let mut applied = Vec::new();
        for node in self.registry.snapshot() {
            if node.health == NodeHealth::Unreachable {
                continue;
            }
            if let Some(adjustment) = self.plan(&node.id) {
                if self.apply(adjustment.clone()) {
                    applied.push(adjustment);
                }
            }
        }
        applied
    }

    /// Adjustments applied to one node, oldest first
    pub fn recent_adjustments(&self, id: &NodeId) -> Vec<CapacityAdjustment> {
        self.applied
            .get(id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Background loop driving [`AdaptiveCapacityManager::run_once`]
pub struct AdaptiveWorker {
    manager: Arc<AdaptiveCapacityManager>,
}

impl AdaptiveWorker {
    /// Create a worker over the given manager
    pub fn new(manager: Arc<AdaptiveCapacityManager>) -> Self {
        Self { manager }
    }

    /// One evaluation pass
    pub fn tick(&self) -> usize {
        let applied = self.manager.run_once();
        if !applied.is_empty() {
            info!(count = applied.len(), "capacity pass applied adjustments");
        }
        applied.len()
    }

    /// Run passes forever at the configured interval
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.manager.config.evaluation_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}
