//! Ensemble load prediction
//!
//! Three estimators share one interface: linear-trend extrapolation,
//! exponential smoothing, and pattern-informed projection. The ensemble
//! takes their confidence-weighted average. Thin history falls back to
//! smoothing alone with capped confidence rather than failing.

use crate::pattern::{linear_fit, mean, variance, PatternDetector, PatternKind};
use chrono::Timelike;
use mesh_common::{clamp_unit, MeshError};
use mesh_telemetry::PerformanceSample;
use std::time::Duration;
use tracing::debug;

/// Sample count below which only smoothing is consulted
pub const DEFAULT_MIN_SAMPLES: usize = 12;

/// Confidence cap applied in the thin-history fallback
const FALLBACK_CONFIDENCE_CAP: f64 = 0.3;

/// Sample count at which the data-volume confidence factor saturates
const CONFIDENCE_SATURATION_SAMPLES: f64 = 50.0;

/// A forecast with its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Predicted value at the horizon
    pub value: f64,
    /// Confidence in [0,1]
    pub confidence: f64,
}

/// Uniform estimator capability
pub trait Estimator: Send + Sync {
    /// Estimator name for logging
    fn name(&self) -> &'static str;

    /// Estimate the value `horizon` past the last sample
    ///
    /// `None` means the estimator cannot contribute for this history,
    /// which is not an error; the ensemble simply proceeds without it.
    fn estimate(&self, samples: &[PerformanceSample], horizon: Duration) -> Option<Estimate>;
}

/// Linear-regression extrapolation
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendEstimator;

impl Estimator for LinearTrendEstimator {
    fn name(&self) -> &'static str {
        "linear-trend"
    }

    fn estimate(&self, samples: &[PerformanceSample], horizon: Duration) -> Option<Estimate> {
        if samples.len() < 3 {
            return None;
        }
        let start = samples.first()?.timestamp;
        let points: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| {
                let hours = (s.timestamp - start).num_seconds() as f64 / 3600.0;
                (hours, s.value)
            })
            .collect();

        let (slope, r2) = linear_fit(&points)?;
        let last_x = points.last()?.0;
        let horizon_hours = horizon.as_secs_f64() / 3600.0;

        let values: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let m = mean(&values);
        let intercept = m - slope * points.iter().map(|(x, _)| x).sum::<f64>() / points.len() as f64;
        let value = slope * (last_x + horizon_hours) + intercept;

        Some(Estimate {
            value,
            confidence: clamp_unit(r2),
        })
    }
}

/// Exponential smoothing over the series
#[derive(Debug, Clone, Copy)]
pub struct SmoothingEstimator {
    /// Smoothing factor; higher weighs recent samples more
    pub alpha: f64,
}

impl Default for SmoothingEstimator {
    fn default() -> Self {
        Self { alpha: 0.3 }
    }
}

impl Estimator for SmoothingEstimator {
    fn name(&self) -> &'static str {
        "exp-smoothing"
    }

    fn estimate(&self, samples: &[PerformanceSample], _horizon: Duration) -> Option<Estimate> {
        let mut iter = samples.iter();
        let mut smoothed = iter.next()?.value;
        for sample in iter {
            smoothed = self.alpha * sample.value + (1.0 - self.alpha) * smoothed;
        }

        // Confidence grows with sample volume and shrinks with dispersion
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let m = mean(&values);
        let sd = variance(&values, m).sqrt();
        let dispersion = if m.abs() > f64::EPSILON {
            (sd / m.abs()).min(1.0)
        } else {
            0.0
        };
        let volume = (samples.len() as f64 / CONFIDENCE_SATURATION_SAMPLES).min(1.0);
        let confidence = clamp_unit(volume * (1.0 - 0.5 * dispersion));

        Some(Estimate {
            value: smoothed,
            confidence,
        })
    }
}

/// Projection from the nearest matching detected pattern
///
/// Runs a fresh pattern pass and, when a daily shape is present,
/// projects the hour bucket the horizon lands in.
#[derive(Debug, Clone, Default)]
pub struct PatternEstimator {
    detector: PatternDetector,
}

impl PatternEstimator {
    /// Create an estimator sharing the given detector thresholds
    pub fn new(detector: PatternDetector) -> Self {
        Self { detector }
    }
}

impl Estimator for PatternEstimator {
    fn name(&self) -> &'static str {
        "pattern-projection"
    }

    fn estimate(&self, samples: &[PerformanceSample], horizon: Duration) -> Option<Estimate> {
        let daily = self
            .detector
            .analyze(samples)
            .into_iter()
            .find(|p| p.kind == PatternKind::Daily)?;

        let last = samples.last()?;
        let target = last.timestamp
            + chrono::Duration::from_std(horizon).unwrap_or_else(|_| chrono::Duration::hours(1));
        let target_hour = target.hour();

        // Mean of the bucket the target lands in
        let bucket: Vec<f64> = samples
            .iter()
            .filter(|s| s.timestamp.hour() == target_hour)
            .map(|s| s.value)
            .collect();
        if bucket.is_empty() {
            return None;
        }

        Some(Estimate {
            value: mean(&bucket),
            confidence: daily.confidence,
        })
    }
}

/// Confidence-weighted ensemble over the three estimators
pub struct CapacityPredictor {
    trend: LinearTrendEstimator,
    smoothing: SmoothingEstimator,
    pattern: PatternEstimator,
    min_samples: usize,
}

impl CapacityPredictor {
    /// Create a predictor with default estimators
    pub fn new() -> Self {
        Self {
            trend: LinearTrendEstimator,
            smoothing: SmoothingEstimator::default(),
            pattern: PatternEstimator::default(),
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Override the thin-history cutoff
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    /// Predict the series value `horizon` past its last sample
    ///
    /// Never fails: an empty history yields a zero-confidence estimate,
    /// and a thin one falls back to smoothing with capped confidence.
    pub fn predict(&self, samples: &[PerformanceSample], horizon: Duration) -> Estimate {
        if samples.is_empty() {
            return Estimate {
                value: 0.0,
                confidence: 0.0,
            };
        }

        if samples.len() < self.min_samples {
            // Absorbed, never raised; the estimate carries the reduced
            // confidence instead
            let err = MeshError::InsufficientHistory {
                have: samples.len(),
                need: self.min_samples,
            };
            debug!(%err, "falling back to smoothing only");
            let base = self
                .smoothing
                .estimate(samples, horizon)
                .unwrap_or(Estimate {
                    value: samples[samples.len() - 1].value,
                    confidence: 0.0,
                });
            return Estimate {
                value: base.value,
                confidence: base.confidence.min(FALLBACK_CONFIDENCE_CAP),
            };
        }

        let estimators: [&dyn Estimator; 3] = [&self.trend, &self.smoothing, &self.pattern];
        let mut weighted_value = 0.0;
        let mut weight = 0.0;
        let mut confidence_sum = 0.0;
        let mut contributors = 0usize;

        for estimator in estimators {
            if let Some(estimate) = estimator.estimate(samples, horizon) {
                debug!(
                    estimator = estimator.name(),
                    value = estimate.value,
                    confidence = estimate.confidence,
                    "estimator contribution"
                );
                weighted_value += estimate.value * estimate.confidence;
                weight += estimate.confidence;
                confidence_sum += estimate.confidence;
                contributors += 1;
            }
        }

        if weight <= f64::EPSILON {
            // Every contributor reported zero confidence; fall back to
            // the smoothed value rather than dividing by nothing
            let base = self
                .smoothing
                .estimate(samples, horizon)
                .unwrap_or(Estimate {
                    value: samples[samples.len() - 1].value,
                    confidence: 0.0,
                });
            return Estimate {
                value: base.value,
                confidence: 0.0,
            };
        }

        let volume = (samples.len() as f64 / CONFIDENCE_SATURATION_SAMPLES).min(1.0);
        let mean_confidence = confidence_sum / contributors as f64;

        Estimate {
            value: weighted_value / weight,
            confidence: clamp_unit(mean_confidence * (0.4 + 0.6 * volume)),
        }
    }
}

impl Default for CapacityPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use mesh_common::MetricKind;

    fn sample(at: DateTime<Utc>, value: f64) -> PerformanceSample {
        PerformanceSample {
            timestamp: at,
            metric: MetricKind::CpuLoad,
            value,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap()
    }

    fn hourly(values: impl Iterator<Item = f64>) -> Vec<PerformanceSample> {
        values
            .enumerate()
            .map(|(h, v)| sample(base_time() + chrono::Duration::hours(h as i64), v))
            .collect()
    }

    #[test]
    fn test_empty_history_is_zero_confidence() {
        let predictor = CapacityPredictor::new();
        let estimate = predictor.predict(&[], Duration::from_secs(3600));
        assert_eq!(estimate.confidence, 0.0);
    }

    #[test]
    fn test_thin_history_falls_back_with_capped_confidence() {
        let predictor = CapacityPredictor::new();
        let series = hourly([50.0, 52.0, 51.0].into_iter());
        let estimate = predictor.predict(&series, Duration::from_secs(3600));

        assert!(estimate.confidence <= FALLBACK_CONFIDENCE_CAP);
        assert!((estimate.value - 51.0).abs() < 3.0);
    }

    #[test]
    fn test_thin_history_routes_through_smoothing() {
        let series = hourly([50.0, 52.0, 51.0].into_iter());
        let smoothed = SmoothingEstimator::default()
            .estimate(&series, Duration::from_secs(3600))
            .unwrap();

        let estimate = CapacityPredictor::new().predict(&series, Duration::from_secs(3600));
        assert_eq!(estimate.value, smoothed.value);
    }

    #[test]
    fn test_rising_series_predicts_higher() {
        let predictor = CapacityPredictor::new();
        let series = hourly((0..48).map(|h| 30.0 + h as f64));
        let last = 30.0 + 47.0;
        let estimate = predictor.predict(&series, Duration::from_secs(4 * 3600));

        assert!(estimate.value > last - 10.0, "value {}", estimate.value);
        assert!(estimate.confidence > 0.3);
    }

    #[test]
    fn test_confidence_monotonic_in_sample_count() {
        let predictor = CapacityPredictor::new();
        let short = hourly((0..16).map(|h| 40.0 + (h % 2) as f64));
        let long = hourly((0..64).map(|h| 40.0 + (h % 2) as f64));

        let short_conf = predictor.predict(&short, Duration::from_secs(3600)).confidence;
        let long_conf = predictor.predict(&long, Duration::from_secs(3600)).confidence;
        assert!(long_conf >= short_conf);
    }

    #[test]
    fn test_confidence_bounded() {
        let predictor = CapacityPredictor::new();
        let series = hourly((0..500).map(|h| 40.0 + h as f64 * 0.1));
        let estimate = predictor.predict(&series, Duration::from_secs(3600));
        assert!((0.0..=1.0).contains(&estimate.confidence));
    }

    #[test]
    fn test_daily_spike_informs_next_day_forecast() {
        // 14 days, hourly, 30% spike at hour 18 daily
        let series = hourly((0..14 * 24).map(|h| if h % 24 == 18 { 130.0 } else { 100.0 }));
        let predictor = CapacityPredictor::new();

        // Last sample is day 14, hour 23; 19 hours ahead lands on hour 18
        let estimate = predictor.predict(&series, Duration::from_secs(19 * 3600));
        assert!(
            estimate.value > 110.0,
            "forecast {} should reflect the daily spike",
            estimate.value
        );
        assert!(estimate.confidence > 0.5);
    }
}
