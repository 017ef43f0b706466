use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{AnalyticsError, Result};
use crate::models::{RollupKey, RollupSeries};
use crate::stats::{percentile, sample_std, sorted};

// ── AlertLevel ────────────────────────────────────────────────────────────────

/// Operational alert levels, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Green,
        AlertLevel::Yellow,
        AlertLevel::Orange,
        AlertLevel::Red,
    ];
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertLevel::Green => "GREEN",
            AlertLevel::Yellow => "YELLOW",
            AlertLevel::Orange => "ORANGE",
            AlertLevel::Red => "RED",
        })
    }
}

// ── AlertConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Percentiles of daily operations for Yellow / Orange / Red.
    pub operations_yellow_pct: f64,
    pub operations_orange_pct: f64,
    pub operations_red_pct: f64,
    /// Percentiles of daily update volumes for Yellow / Orange.
    pub updates_yellow_pct: f64,
    pub updates_orange_pct: f64,
    /// Day-over-day growth (percent) for Yellow / Orange / Red.
    pub growth_yellow: f64,
    pub growth_orange: f64,
    pub growth_red: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            operations_yellow_pct: 75.0,
            operations_orange_pct: 90.0,
            operations_red_pct: 95.0,
            updates_yellow_pct: 75.0,
            updates_orange_pct: 90.0,
            growth_yellow: 50.0,
            growth_orange: 100.0,
            growth_red: 150.0,
        }
    }
}

/// Volume cut-offs derived from the daily history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub baseline_operations: f64,
    pub operations_std: Option<f64>,
    pub operations_yellow: f64,
    pub operations_orange: f64,
    pub operations_red: f64,
    pub demographic_yellow: f64,
    pub demographic_orange: f64,
    pub biometric_yellow: f64,
    pub biometric_orange: f64,
    pub growth_yellow: f64,
    pub growth_orange: f64,
    pub growth_red: f64,
    /// Percentiles the volume cut-offs were taken at.
    pub operations_yellow_pct: f64,
    pub operations_orange_pct: f64,
    pub operations_red_pct: f64,
    pub updates_yellow_pct: f64,
    pub updates_orange_pct: f64,
}

/// `95` -> `95th`, `92.5` -> `92.5th`.
fn ordinal(pct: f64) -> String {
    if pct.fract() != 0.0 {
        return format!("{pct}th");
    }
    let n = pct as u64;
    let suffix = match (n % 10, n % 100) {
        (1, r) if r != 11 => "st",
        (2, r) if r != 12 => "nd",
        (3, r) if r != 13 => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Classification of one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAlert {
    pub period: RollupKey,
    pub total_operations: u64,
    pub growth: Option<f64>,
    pub level: AlertLevel,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: AlertLevel,
    pub days: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    pub thresholds: AlertThresholds,
    pub alerts: Vec<DayAlert>,
    pub distribution: Vec<LevelCount>,
}

impl AlertReport {
    pub fn count(&self, level: AlertLevel) -> usize {
        self.alerts.iter().filter(|a| a.level == level).count()
    }
}

// ── EarlyWarning ──────────────────────────────────────────────────────────────

pub struct EarlyWarning {
    config: AlertConfig,
}

impl EarlyWarning {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    /// Derive thresholds from a daily rollup.
    pub fn thresholds(&self, daily: &RollupSeries) -> Result<AlertThresholds> {
        if daily.is_empty() {
            return Err(AnalyticsError::insufficient("alert thresholds", 1, 0));
        }
        let c = &self.config;
        let ops = sorted(&daily.operations());
        let demo = sorted(&daily.values(|t| t.demographic_updates));
        let bio = sorted(&daily.values(|t| t.biometric_updates));

        Ok(AlertThresholds {
            baseline_operations: percentile(&ops, 50.0),
            operations_std: sample_std(&ops),
            operations_yellow: percentile(&ops, c.operations_yellow_pct),
            operations_orange: percentile(&ops, c.operations_orange_pct),
            operations_red: percentile(&ops, c.operations_red_pct),
            demographic_yellow: percentile(&demo, c.updates_yellow_pct),
            demographic_orange: percentile(&demo, c.updates_orange_pct),
            biometric_yellow: percentile(&bio, c.updates_yellow_pct),
            biometric_orange: percentile(&bio, c.updates_orange_pct),
            growth_yellow: c.growth_yellow,
            growth_orange: c.growth_orange,
            growth_red: c.growth_red,
            operations_yellow_pct: c.operations_yellow_pct,
            operations_orange_pct: c.operations_orange_pct,
            operations_red_pct: c.operations_red_pct,
            updates_yellow_pct: c.updates_yellow_pct,
            updates_orange_pct: c.updates_orange_pct,
        })
    }

    /// Alert level for one day: the most severe level any rule triggers.
    pub fn classify(
        t: &AlertThresholds,
        operations: f64,
        demographic: f64,
        biometric: f64,
        growth: Option<f64>,
    ) -> (AlertLevel, Vec<String>) {
        let mut level = AlertLevel::Green;
        let mut reasons = Vec::new();
        let mut raise = |to: AlertLevel, reason: String| {
            level = level.max(to);
            reasons.push(reason);
        };

        let ops_reason = |pct: f64| {
            format!("Operations at {operations:.0} (>= {} percentile)", ordinal(pct))
        };
        if operations >= t.operations_red {
            raise(AlertLevel::Red, ops_reason(t.operations_red_pct));
        } else if operations >= t.operations_orange {
            raise(AlertLevel::Orange, ops_reason(t.operations_orange_pct));
        } else if operations >= t.operations_yellow {
            raise(AlertLevel::Yellow, ops_reason(t.operations_yellow_pct));
        }

        for (name, value, yellow, orange) in [
            ("Demographic", demographic, t.demographic_yellow, t.demographic_orange),
            ("Biometric", biometric, t.biometric_yellow, t.biometric_orange),
        ] {
            if value >= orange {
                raise(
                    AlertLevel::Orange,
                    format!(
                        "{name} updates at {value:.0} (>= {} percentile)",
                        ordinal(t.updates_orange_pct)
                    ),
                );
            } else if value >= yellow {
                raise(AlertLevel::Yellow, format!("{name} updates elevated ({value:.0})"));
            }
        }

        if let Some(g) = growth {
            if g > t.growth_red {
                raise(AlertLevel::Red, format!("Critical growth rate: {g:.1}%"));
            } else if g > t.growth_orange {
                raise(AlertLevel::Orange, format!("High growth rate: {g:.1}%"));
            } else if g > t.growth_yellow {
                raise(AlertLevel::Yellow, format!("Elevated growth rate: {g:.1}%"));
            }
        }

        (level, reasons)
    }

    /// Classify every day of a daily rollup against thresholds derived from
    /// the same history.
    pub fn analyze(&self, daily: &RollupSeries) -> Result<AlertReport> {
        let thresholds = self.thresholds(daily)?;
        let alerts: Vec<DayAlert> = daily
            .rows
            .iter()
            .map(|row| {
                let growth = row.growth.operations;
                let (level, reasons) = Self::classify(
                    &thresholds,
                    row.total_operations() as f64,
                    row.totals.demographic_updates as f64,
                    row.totals.biometric_updates as f64,
                    growth,
                );
                DayAlert {
                    period: row.key.clone(),
                    total_operations: row.total_operations(),
                    growth,
                    level,
                    reasons,
                }
            })
            .collect();

        let distribution = AlertLevel::ALL
            .iter()
            .map(|&level| {
                let days = alerts.iter().filter(|a| a.level == level).count();
                LevelCount {
                    level,
                    days,
                    pct: days as f64 / alerts.len() as f64 * 100.0,
                }
            })
            .collect();

        debug!(
            "Early warning: {} days classified, {} red",
            alerts.len(),
            alerts.iter().filter(|a| a.level == AlertLevel::Red).count()
        );

        Ok(AlertReport {
            thresholds,
            alerts,
            distribution,
        })
    }
}

impl Default for EarlyWarning {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
