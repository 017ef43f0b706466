use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, Result};
use crate::models::{RollupKey, RollupSeries};
use crate::stats::{coefficient_of_variation, mean, percentile, sample_std, sorted};

// ── AnomalyConfig ─────────────────────────────────────────────────────────────

/// Thresholds for the stress-event detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// A period is anomalous when `|z|` exceeds this.
    pub z_threshold: f64,
    /// Multiplier applied to the IQR to place the outlier fences.
    pub iqr_multiplier: f64,
}

impl AnomalyConfig {
    /// Thresholds for daily series.
    pub fn daily() -> Self {
        Self {
            z_threshold: 2.5,
            iqr_multiplier: 1.5,
        }
    }

    /// Thresholds for monthly series; fewer points, so a lower z bar.
    pub fn monthly() -> Self {
        Self {
            z_threshold: 2.0,
            iqr_multiplier: 1.5,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self::daily()
    }
}

/// Thresholds as written in a config file; absent fields keep the base's.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnomalyOverrides {
    pub z_threshold: Option<f64>,
    pub iqr_multiplier: Option<f64>,
}

impl AnomalyConfig {
    pub fn overlay(self, overrides: AnomalyOverrides) -> Self {
        Self {
            z_threshold: overrides.z_threshold.unwrap_or(self.z_threshold),
            iqr_multiplier: overrides.iqr_multiplier.unwrap_or(self.iqr_multiplier),
        }
    }
}

// ── SeriesStats ───────────────────────────────────────────────────────────────

/// Location and spread of a series of period totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with a single observation.
    pub std_dev: Option<f64>,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesStats {
    pub fn compute(values: &[f64], iqr_multiplier: f64) -> Result<Self> {
        let data = sorted(values);
        let (Some(&min), Some(&max)) = (data.first(), data.last()) else {
            return Err(AnalyticsError::insufficient("series statistics", 1, 0));
        };
        let q1 = percentile(&data, 25.0);
        let q3 = percentile(&data, 75.0);
        let iqr = q3 - q1;
        Ok(Self {
            count: data.len(),
            mean: mean(&data).unwrap_or(0.0),
            std_dev: sample_std(&data),
            median: percentile(&data, 50.0),
            q1,
            q3,
            iqr,
            lower_fence: q1 - iqr_multiplier * iqr,
            upper_fence: q3 + iqr_multiplier * iqr,
            min,
            max,
        })
    }

    /// Absolute z-score of `value`; `None` when the deviation is zero or
    /// undefined.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        match self.std_dev {
            Some(sd) if sd > 0.0 => Some(((value - self.mean) / sd).abs()),
            _ => None,
        }
    }
}

// ── StressEvent ───────────────────────────────────────────────────────────────

/// Which rule flagged a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationKind {
    ZScore,
    AboveUpperFence,
    BelowLowerFence,
}

/// A period whose load deviates from the series' normal range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressEvent {
    /// Position of the period in the analysed series.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<RollupKey>,
    pub value: f64,
    /// Median of the series.
    pub baseline: f64,
    pub z_score: Option<f64>,
    pub kinds: Vec<DeviationKind>,
    /// `(value − baseline) / baseline`; `None` for a zero baseline.
    pub excess: Option<f64>,
    /// Periods until load returned to the recovery threshold. Filled in by
    /// [`crate::resilience::attach_recovery`].
    pub recovery: Option<usize>,
}

/// Detector output for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub config: AnomalyConfig,
    pub stats: SeriesStats,
    pub events: Vec<StressEvent>,
    /// Flagged periods as a percentage of all periods.
    pub frequency_pct: f64,
}

impl AnomalyReport {
    pub fn flagged_indices(&self) -> Vec<usize> {
        self.events.iter().map(|e| e.index).collect()
    }
}

// ── AnomalyDetector ───────────────────────────────────────────────────────────

/// Flags periods by z-score or by falling outside the IQR fences.
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Detect stress events in a bare series of values.
    pub fn detect(&self, values: &[f64]) -> Result<AnomalyReport> {
        self.detect_keyed(values, None)
    }

    /// Detect stress events in the total operations of a rollup series.
    pub fn detect_series(&self, series: &RollupSeries) -> Result<AnomalyReport> {
        let keys = series.keys();
        self.detect_keyed(&series.operations(), Some(&keys))
    }

    fn detect_keyed(&self, values: &[f64], keys: Option<&[RollupKey]>) -> Result<AnomalyReport> {
        let stats = SeriesStats::compute(values, self.config.iqr_multiplier)?;
        let baseline = stats.median;

        let events: Vec<StressEvent> = values
            .iter()
            .enumerate()
            .filter_map(|(index, &value)| {
                let z_score = stats.z_score(value);
                let mut kinds = Vec::new();
                if z_score.is_some_and(|z| z > self.config.z_threshold) {
                    kinds.push(DeviationKind::ZScore);
                }
                if value > stats.upper_fence {
                    kinds.push(DeviationKind::AboveUpperFence);
                }
                if value < stats.lower_fence {
                    kinds.push(DeviationKind::BelowLowerFence);
                }
                if kinds.is_empty() {
                    return None;
                }
                Some(StressEvent {
                    index,
                    period: keys.and_then(|k| k.get(index).cloned()),
                    value,
                    baseline,
                    z_score,
                    kinds,
                    excess: if baseline == 0.0 {
                        None
                    } else {
                        Some((value - baseline) / baseline)
                    },
                    recovery: None,
                })
            })
            .collect();

        debug!(
            "Anomaly detection: {} of {} periods flagged (z > {}, IQR x{})",
            events.len(),
            values.len(),
            self.config.z_threshold,
            self.config.iqr_multiplier
        );

        Ok(AnomalyReport {
            config: self.config,
            stats,
            frequency_pct: events.len() as f64 / values.len() as f64 * 100.0,
            events,
        })
    }
}

// ── Peaks & volatility ────────────────────────────────────────────────────────

/// One of the busiest periods of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakPeriod {
    pub key: RollupKey,
    pub total_operations: u64,
}

/// The `n` periods with the highest total operations, busiest first. Ties
/// keep chronological order.
pub fn top_periods(series: &RollupSeries, n: usize) -> Vec<PeakPeriod> {
    let mut rows: Vec<_> = series.rows.iter().collect();
    rows.sort_by(|a, b| b.total_operations().cmp(&a.total_operations()));
    rows.into_iter()
        .take(n)
        .map(|r| PeakPeriod {
            key: r.key.clone(),
            total_operations: r.total_operations(),
        })
        .collect()
}

/// Dispersion of daily and monthly load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    /// Coefficient of variation of daily operations, in percent.
    pub daily_cv: Option<f64>,
    /// Coefficient of variation of monthly operations, in percent.
    pub monthly_cv: Option<f64>,
    /// Sample standard deviation of month-over-month operations growth.
    pub monthly_growth_std: Option<f64>,
}

impl VolatilityMetrics {
    pub fn compute(daily: &RollupSeries, monthly: &RollupSeries) -> Self {
        let growth: Vec<f64> = monthly
            .rows
            .iter()
            .filter_map(|r| r.growth.operations)
            .collect();
        Self {
            daily_cv: coefficient_of_variation(&daily.operations()),
            monthly_cv: coefficient_of_variation(&monthly.operations()),
            monthly_growth_std: sample_std(&growth),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
