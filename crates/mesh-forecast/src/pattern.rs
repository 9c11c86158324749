//! Recurring-pattern detection over performance samples
//!
//! Each `analyze` call is a complete fresh pass over the window it is
//! given; nothing is merged with earlier passes, so a pattern whose
//! supporting samples age out simply stops being reported.

use chrono::{DateTime, Datelike, Timelike, Utc};
use mesh_common::clamp_unit;
use mesh_telemetry::PerformanceSample;
use serde::{Deserialize, Serialize};

/// Kind of recurring pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    /// Same-hour recurrence across days
    Daily,
    /// Isolated excursion beyond k standard deviations
    Spike,
    /// Sustained monotonic drift
    Trend,
    /// Same-weekday recurrence across weeks
    Seasonal,
}

/// A detected pattern; derived per pass, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPattern {
    /// Pattern kind
    pub kind: PatternKind,
    /// Detection confidence in [0,1]
    pub confidence: f64,
    /// Size of the effect in the sample's unit (peak delta, total drift,
    /// or spike height in standard deviations)
    pub magnitude: f64,
    /// Start of the supporting window
    pub window_start: DateTime<Utc>,
    /// End of the supporting window
    pub window_end: DateTime<Utc>,
    /// Hour of day the daily pattern peaks at
    pub peak_hour: Option<u32>,
    /// Weekday (0 = Monday) the seasonal pattern peaks at
    pub peak_weekday: Option<u32>,
    /// Fitted slope per hour for trends
    pub slope_per_hour: Option<f64>,
}

/// Detection thresholds
#[derive(Debug, Clone, Copy)]
pub struct PatternConfig {
    /// Days of coverage required before daily detection applies
    pub daily_min_days: i64,
    /// Fraction of variance the hour buckets must explain
    pub daily_variance_reduction: f64,
    /// Standard deviations beyond the mean that define a spike
    pub spike_sigma: f64,
    /// Samples required before spike statistics are meaningful
    pub spike_min_samples: usize,
    /// Minimum absolute slope (per hour) for a trend
    pub trend_min_slope_per_hour: f64,
    /// Minimum R² for a trend fit
    pub trend_min_r2: f64,
    /// Weeks of coverage required before seasonal detection applies
    pub seasonal_min_weeks: i64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            daily_min_days: 3,
            daily_variance_reduction: 0.3,
            spike_sigma: 3.0,
            spike_min_samples: 12,
            trend_min_slope_per_hour: 0.05,
            trend_min_r2: 0.5,
            seasonal_min_weeks: 2,
        }
    }
}

/// Stateless pattern detector
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    /// Create a detector with custom thresholds
    pub fn with_config(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Run one fresh detection pass over the given samples
    pub fn analyze(&self, samples: &[PerformanceSample]) -> Vec<DetectedPattern> {
        let mut patterns = Vec::new();
        if samples.len() < 2 {
            return patterns;
        }

        if let Some(daily) = self.detect_bucketed(
            samples,
            PatternKind::Daily,
            |s| s.timestamp.hour(),
            24,
            self.config.daily_min_days * 24,
        ) {
            patterns.push(daily);
        }
        if let Some(seasonal) = self.detect_bucketed(
            samples,
            PatternKind::Seasonal,
            |s| s.timestamp.weekday().num_days_from_monday(),
            7,
            self.config.seasonal_min_weeks * 7 * 24,
        ) {
            patterns.push(seasonal);
        }
        if let Some(spike) = self.detect_spike(samples) {
            patterns.push(spike);
        }
        if let Some(trend) = self.detect_trend(samples) {
            patterns.push(trend);
        }

        patterns
    }

    /// Shared bucket-recurrence detector for daily and seasonal shapes
    ///
    /// Compares per-bucket means against the bucket-agnostic mean and
    /// reports when the buckets explain enough of the variance.
    fn detect_bucketed(
        &self,
        samples: &[PerformanceSample],
        kind: PatternKind,
        bucket_of: impl Fn(&PerformanceSample) -> u32,
        bucket_count: usize,
        min_span_hours: i64,
    ) -> Option<DetectedPattern> {
        let span = samples.last()?.timestamp - samples.first()?.timestamp;
        if span.num_hours() < min_span_hours {
            return None;
        }

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let overall_mean = mean(&values);
        let total_variance = variance(&values, overall_mean);
        if total_variance <= f64::EPSILON {
            return None;
        }

        let mut sums = vec![0.0; bucket_count];
        let mut counts = vec![0usize; bucket_count];
        for sample in samples {
            let bucket = bucket_of(sample) as usize % bucket_count;
            sums[bucket] += sample.value;
            counts[bucket] += 1;
        }

        // Between-bucket variance: how much of the spread the bucket
        // means account for
        let mut explained = 0.0;
        let mut peak_bucket = 0usize;
        let mut peak_mean = f64::MIN;
        for bucket in 0..bucket_count {
            if counts[bucket] == 0 {
                continue;
            }
            let bucket_mean = sums[bucket] / counts[bucket] as f64;
            explained += counts[bucket] as f64 * (bucket_mean - overall_mean).powi(2);
            if bucket_mean > peak_mean {
                peak_mean = bucket_mean;
                peak_bucket = bucket;
            }
        }
        explained /= values.len() as f64;

        let reduction = explained / total_variance;
        if reduction <= self.config.daily_variance_reduction {
            return None;
        }

        Some(DetectedPattern {
            kind,
            confidence: clamp_unit(reduction),
            magnitude: peak_mean - overall_mean,
            window_start: samples.first()?.timestamp,
            window_end: samples.last()?.timestamp,
            peak_hour: (kind == PatternKind::Daily).then_some(peak_bucket as u32),
            peak_weekday: (kind == PatternKind::Seasonal).then_some(peak_bucket as u32),
            slope_per_hour: None,
        })
    }

    fn detect_spike(&self, samples: &[PerformanceSample]) -> Option<DetectedPattern> {
        if samples.len() < self.config.spike_min_samples {
            return None;
        }
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let m = mean(&values);
        let sd = variance(&values, m).sqrt();
        if sd <= f64::EPSILON {
            return None;
        }

        let spike = samples
            .iter()
            .map(|s| (s, (s.value - m) / sd))
            .filter(|(_, z)| *z > self.config.spike_sigma)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let (sample, z) = spike;
        let k = self.config.spike_sigma;
        Some(DetectedPattern {
            kind: PatternKind::Spike,
            // Half confidence right at the threshold, full at 3k
            confidence: clamp_unit(0.5 + (z - k) / (2.0 * k)),
            magnitude: z,
            window_start: sample.timestamp,
            window_end: sample.timestamp,
            peak_hour: None,
            peak_weekday: None,
            slope_per_hour: None,
        })
    }

    fn detect_trend(&self, samples: &[PerformanceSample]) -> Option<DetectedPattern> {
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
        if slope.abs() < self.config.trend_min_slope_per_hour || r2 < self.config.trend_min_r2 {
            return None;
        }

        let span_hours = points.last()?.0;
        Some(DetectedPattern {
            kind: PatternKind::Trend,
            confidence: clamp_unit(r2),
            magnitude: slope * span_hours,
            window_start: start,
            window_end: samples.last()?.timestamp,
            peak_hour: None,
            peak_weekday: None,
            slope_per_hour: Some(slope),
        })
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Least-squares fit returning (slope, R²); None on a degenerate x-range
pub(crate) fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();

    let r2 = if ss_tot <= f64::EPSILON {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).max(0.0)
    };
    Some((slope, r2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
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

    /// Hourly series over `days` days: flat baseline with an elevated
    /// value at one hour of every day
    fn daily_series(days: i64, spike_hour: u32, baseline: f64, spike: f64) -> Vec<PerformanceSample> {
        let start = base_time();
        (0..days * 24)
            .map(|h| {
                let at = start + Duration::hours(h);
                let value = if at.hour() == spike_hour { spike } else { baseline };
                sample(at, value)
            })
            .collect()
    }

    #[test]
    fn test_daily_pattern_detected() {
        let detector = PatternDetector::default();
        let series = daily_series(14, 18, 100.0, 130.0);
        let patterns = detector.analyze(&series);

        let daily = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Daily)
            .expect("daily pattern");
        assert!(daily.confidence > 0.7, "confidence {}", daily.confidence);
        assert_eq!(daily.peak_hour, Some(18));
        assert!(daily.magnitude > 20.0);
    }

    #[test]
    fn test_daily_needs_three_days() {
        let detector = PatternDetector::default();
        let series = daily_series(2, 18, 100.0, 130.0);
        assert!(!detector
            .analyze(&series)
            .iter()
            .any(|p| p.kind == PatternKind::Daily));
    }

    #[test]
    fn test_spike_detected_with_scaled_confidence() {
        let detector = PatternDetector::default();
        let start = base_time();
        let mut series: Vec<PerformanceSample> = (0..48)
            .map(|h| sample(start + Duration::hours(h), 50.0 + (h % 3) as f64))
            .collect();
        series.push(sample(start + Duration::hours(48), 200.0));

        let patterns = detector.analyze(&series);
        let spike = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Spike)
            .expect("spike pattern");
        assert!(spike.magnitude > 3.0);
        assert!(spike.confidence > 0.5);
    }

    #[test]
    fn test_trend_detected_on_steady_drift() {
        let detector = PatternDetector::default();
        let start = base_time();
        let series: Vec<PerformanceSample> = (0..72)
            .map(|h| sample(start + Duration::hours(h), 40.0 + h as f64 * 0.5))
            .collect();

        let patterns = detector.analyze(&series);
        let trend = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Trend)
            .expect("trend pattern");
        assert!(trend.confidence > 0.9);
        let slope = trend.slope_per_hour.unwrap();
        assert!((slope - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_noise_yields_no_confident_trend() {
        let detector = PatternDetector::default();
        let start = base_time();
        // Deterministic pseudo-noise with no drift
        let series: Vec<PerformanceSample> = (0..200)
            .map(|h| {
                let noise = ((h * 7919) % 101) as f64;
                sample(start + Duration::hours(h), noise)
            })
            .collect();

        let patterns = detector.analyze(&series);
        assert!(
            !patterns
                .iter()
                .any(|p| p.kind == PatternKind::Trend && p.confidence > 0.5),
            "noise must not produce a confident trend"
        );
    }

    #[test]
    fn test_seasonal_pattern_detected() {
        let detector = PatternDetector::default();
        let start = base_time();
        // Four weeks, Mondays run hot
        let series: Vec<PerformanceSample> = (0..24 * 28)
            .map(|h| {
                let at = start + Duration::hours(h);
                let value = if at.weekday().num_days_from_monday() == 0 {
                    90.0
                } else {
                    40.0
                };
                sample(at, value)
            })
            .collect();

        let patterns = detector.analyze(&series);
        let seasonal = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Seasonal)
            .expect("seasonal pattern");
        assert_eq!(seasonal.peak_weekday, Some(0));
        assert!(seasonal.confidence > 0.7);
    }

    #[test]
    fn test_flat_series_yields_nothing() {
        let detector = PatternDetector::default();
        let start = base_time();
        let series: Vec<PerformanceSample> = (0..24 * 7)
            .map(|h| sample(start + Duration::hours(h), 55.0))
            .collect();
        assert!(detector.analyze(&series).is_empty());
    }
}
