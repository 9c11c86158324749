//! Pattern detection, load prediction, and adaptive capacity
//!
//! The control loop of the mesh: historical samples flow through the
//! pattern detector into an ensemble predictor, and the adaptive manager
//! turns forecasts into bounded capacity adjustments per configured
//! strategy. Every pass is fresh; patterns are never accumulated across
//! passes.

#![warn(missing_docs)]

pub mod adaptive;
pub mod pattern;
pub mod predict;

pub use adaptive::{
    AdaptiveCapacityManager, AdaptiveWorker, AdjustmentStrategy, CapacityAdjustment,
    CapacityConfig,
};
pub use pattern::{DetectedPattern, PatternConfig, PatternDetector, PatternKind};
pub use predict::{
    CapacityPredictor, Estimate, Estimator, LinearTrendEstimator, PatternEstimator,
    SmoothingEstimator,
};
