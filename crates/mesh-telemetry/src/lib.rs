//! Network metrics collection and quality scoring
//!
//! Samples latency, bandwidth, loss, and host load per node through a
//! pluggable prober with a hard timeout; folds samples into a composite
//! quality score in [0,1]; retains a bounded per-node history feeding
//! pattern detection downstream.

#![warn(missing_docs)]

pub mod collector;
pub mod history;
pub mod metrics;
pub mod probe;

pub use collector::{MetricsCollector, Sample};
pub use history::{MetricsHistory, PerformanceSample, SampleLog};
pub use metrics::{NetworkMetrics, QualityWeights};
pub use probe::{ProbeReading, Prober, StaticProber};
