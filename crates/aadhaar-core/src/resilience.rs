use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::anomaly::StressEvent;
use crate::error::{AnalyticsError, Result};
use crate::stats::{coefficient_of_variation, mean, median, percentile, sorted};

// ── ResilienceConfig ──────────────────────────────────────────────────────────

/// Caps, reference values and thresholds for the composite resilience score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// A period has recovered once its value is at most this multiple of the
    /// baseline.
    pub recovery_multiplier: f64,

    pub frequency_cap: f64,
    /// Stress frequency (percent of periods) at which the frequency score hits 0.
    pub frequency_reference_pct: f64,
    pub stability_cap: f64,
    /// Coefficient of variation (percent) at which the stability score hits 0.
    pub cv_reference_pct: f64,
    pub spare_capacity_cap: f64,
    pub recovery_cap: f64,
    /// Average recovery (periods) at which the recovery score hits 0.
    pub recovery_reference_periods: f64,
    /// Recovery score used when no event has recovered.
    pub neutral_recovery_score: f64,
    pub absorption_cap: f64,
    /// Absorption (percent) that earns the full absorption score.
    pub absorption_reference_pct: f64,
    /// Percentile of the series used as the peak for absorption.
    pub absorption_percentile: f64,

    pub excellent_threshold: f64,
    pub good_threshold: f64,
    pub moderate_threshold: f64,

    pub high_frequency_pct: f64,
    pub high_cv_pct: f64,
    pub slow_recovery_periods: f64,
    pub high_utilization_pct: f64,
    pub low_absorption_pct: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            recovery_multiplier: 1.2,
            frequency_cap: 10.0,
            frequency_reference_pct: 20.0,
            stability_cap: 20.0,
            cv_reference_pct: 200.0,
            spare_capacity_cap: 30.0,
            recovery_cap: 20.0,
            recovery_reference_periods: 10.0,
            neutral_recovery_score: 10.0,
            absorption_cap: 20.0,
            absorption_reference_pct: 500.0,
            absorption_percentile: 99.0,
            excellent_threshold: 75.0,
            good_threshold: 50.0,
            moderate_threshold: 30.0,
            high_frequency_pct: 15.0,
            high_cv_pct: 100.0,
            slow_recovery_periods: 3.0,
            high_utilization_pct: 70.0,
            low_absorption_pct: 200.0,
        }
    }
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Number of periods after `index` until the series first returns to at most
/// `multiplier × baseline`. `None` when no later period qualifies.
pub fn recovery_time(values: &[f64], index: usize, baseline: f64, multiplier: f64) -> Option<usize> {
    let threshold = baseline * multiplier;
    values
        .iter()
        .enumerate()
        .skip(index + 1)
        .find(|(_, &v)| v <= threshold)
        .map(|(j, _)| j - index)
}

/// Copies of `events` with their recovery time filled in from `values`.
pub fn attach_recovery(events: &[StressEvent], values: &[f64], multiplier: f64) -> Vec<StressEvent> {
    events
        .iter()
        .map(|event| StressEvent {
            recovery: recovery_time(values, event.index, event.baseline, multiplier),
            ..event.clone()
        })
        .collect()
}

/// Summary of the defined recovery times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    /// Events that recovered.
    pub recovered: usize,
    /// Events that never recovered within the series.
    pub unrecovered: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<usize>,
}

impl RecoveryStats {
    pub fn from_events(events: &[StressEvent]) -> Self {
        let times: Vec<usize> = events.iter().filter_map(|e| e.recovery).collect();
        let as_f64: Vec<f64> = times.iter().map(|&t| t as f64).collect();
        Self {
            recovered: times.len(),
            unrecovered: events.len() - times.len(),
            mean: mean(&as_f64),
            median: median(&as_f64),
            max: times.iter().copied().max(),
        }
    }
}

// ── Score ─────────────────────────────────────────────────────────────────────

/// Raw measurements feeding the sub-scores, all percentages except
/// `avg_recovery` (periods).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceMetrics {
    pub periods: usize,
    pub stress_events: usize,
    pub stress_frequency_pct: f64,
    pub cv_pct: f64,
    pub baseline: f64,
    pub peak: f64,
    pub utilization_pct: f64,
    pub avg_recovery: Option<f64>,
    pub absorption_pct: f64,
}

/// The five capped sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResilienceComponents {
    pub stress_frequency: f64,
    pub load_stability: f64,
    pub spare_capacity: f64,
    pub recovery_speed: f64,
    pub stress_absorption: f64,
}

impl ResilienceComponents {
    pub fn total(&self) -> f64 {
        self.stress_frequency
            + self.load_stability
            + self.spare_capacity
            + self.recovery_speed
            + self.stress_absorption
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assessment {
    Excellent,
    Good,
    Moderate,
    Concerning,
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Assessment::Excellent => "Excellent",
            Assessment::Good => "Good",
            Assessment::Moderate => "Moderate",
            Assessment::Concerning => "Concerning",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub area: String,
    pub action: String,
}

/// Composite 0–100 resilience score with its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceScore {
    pub score: f64,
    pub assessment: Assessment,
    pub components: ResilienceComponents,
    pub metrics: ResilienceMetrics,
    pub recovery: RecoveryStats,
    pub recommendations: Vec<Recommendation>,
}

fn capped(value: f64, cap: f64) -> f64 {
    value.clamp(0.0, cap)
}

/// Computes the composite resilience score of a load series.
pub struct ResilienceScorer {
    config: ResilienceConfig,
}

impl ResilienceScorer {
    pub fn new(config: ResilienceConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ResilienceConfig::default())
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Score `values` given the stress events detected on them. Events should
    /// already carry recovery times (see [`attach_recovery`]).
    ///
    /// Needs at least two periods and a positive mean and median.
    pub fn score(&self, values: &[f64], events: &[StressEvent]) -> Result<ResilienceScore> {
        if values.len() < 2 {
            return Err(AnalyticsError::insufficient("resilience score", 2, values.len()));
        }
        let data = sorted(values);
        let baseline = percentile(&data, 50.0);
        let peak = data[data.len() - 1];
        let (Some(avg), Some(cv_pct)) = (mean(values), coefficient_of_variation(values)) else {
            return Err(AnalyticsError::insufficient("resilience score", 2, values.len()));
        };
        if avg <= 0.0 || baseline <= 0.0 {
            return Err(AnalyticsError::insufficient(
                "resilience score (positive load)",
                1,
                0,
            ));
        }

        let c = &self.config;
        let recovery = RecoveryStats::from_events(events);
        let metrics = ResilienceMetrics {
            periods: values.len(),
            stress_events: events.len(),
            stress_frequency_pct: events.len() as f64 / values.len() as f64 * 100.0,
            cv_pct,
            baseline,
            peak,
            utilization_pct: avg / peak * 100.0,
            avg_recovery: recovery.mean,
            absorption_pct: (percentile(&data, c.absorption_percentile) - baseline) / baseline
                * 100.0,
        };

        let components = ResilienceComponents {
            stress_frequency: capped(
                c.frequency_cap * (1.0 - metrics.stress_frequency_pct / c.frequency_reference_pct),
                c.frequency_cap,
            ),
            load_stability: capped(
                c.stability_cap * (1.0 - metrics.cv_pct / c.cv_reference_pct),
                c.stability_cap,
            ),
            spare_capacity: capped(
                c.spare_capacity_cap * (1.0 - metrics.utilization_pct / 100.0),
                c.spare_capacity_cap,
            ),
            recovery_speed: match metrics.avg_recovery {
                Some(avg) => capped(
                    c.recovery_cap * (1.0 - avg / c.recovery_reference_periods),
                    c.recovery_cap,
                ),
                None => c.neutral_recovery_score,
            },
            stress_absorption: capped(
                metrics.absorption_pct / c.absorption_reference_pct * c.absorption_cap,
                c.absorption_cap,
            ),
        };

        let score = components.total();
        debug!(
            "Resilience score {:.1} over {} periods ({} stress events)",
            score, metrics.periods, metrics.stress_events
        );

        Ok(ResilienceScore {
            score,
            assessment: self.assess(score),
            components,
            metrics,
            recovery,
            recommendations: self.recommend(&metrics),
        })
    }

    pub fn assess(&self, score: f64) -> Assessment {
        if score >= self.config.excellent_threshold {
            Assessment::Excellent
        } else if score >= self.config.good_threshold {
            Assessment::Good
        } else if score >= self.config.moderate_threshold {
            Assessment::Moderate
        } else {
            Assessment::Concerning
        }
    }

    pub fn recommend(&self, metrics: &ResilienceMetrics) -> Vec<Recommendation> {
        let c = &self.config;
        let mut out = Vec::new();
        let mut push = |priority, area: &str, action: String| {
            out.push(Recommendation {
                priority,
                area: area.to_string(),
                action,
            })
        };

        if metrics.stress_frequency_pct > c.high_frequency_pct {
            push(
                Priority::High,
                "Stress frequency",
                format!(
                    "{:.1}% of periods are stress events; add standby capacity for recurring surges",
                    metrics.stress_frequency_pct
                ),
            );
        }
        if metrics.cv_pct > c.high_cv_pct {
            push(
                Priority::High,
                "Load stability",
                format!(
                    "Load varies with CV {:.1}%; smooth demand through appointment scheduling",
                    metrics.cv_pct
                ),
            );
        }
        if metrics
            .avg_recovery
            .is_some_and(|r| r > c.slow_recovery_periods)
        {
            push(
                Priority::Medium,
                "Recovery speed",
                format!(
                    "Average recovery takes {:.1} periods; prepare surge response procedures",
                    metrics.avg_recovery.unwrap_or_default()
                ),
            );
        }
        if metrics.utilization_pct > c.high_utilization_pct {
            push(
                Priority::Medium,
                "Spare capacity",
                format!(
                    "Average load is {:.1}% of peak; expand baseline capacity",
                    metrics.utilization_pct
                ),
            );
        }
        if metrics.absorption_pct < c.low_absorption_pct {
            push(
                Priority::Low,
                "Stress absorption",
                format!(
                    "Peak load reaches only {:.1}% above baseline; test surge capacity",
                    metrics.absorption_pct
                ),
            );
        }
        out
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
