use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{GrowthRates, RollupKey, RollupSeries};
use crate::stats::mean;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsConfig {
    /// Updates dominate a day when updates/enrolment exceeds this.
    pub dominance_ratio: f64,
    /// Consecutive dominant days that mark the transition.
    pub sustained_days: usize,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            dominance_ratio: 1.0,
            sustained_days: 3,
        }
    }
}

/// The day updates began to consistently outnumber enrolments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPoint {
    /// Last day of the first sustained run of update dominance.
    pub period: RollupKey,
    pub index: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRatio {
    pub period: RollupKey,
    pub updates_to_enrolment: Option<f64>,
}

/// Months of shrinking update demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueAnalysis {
    pub demographic_decline_months: Vec<RollupKey>,
    pub biometric_decline_months: Vec<RollupKey>,
    /// Mean month-over-month demographic growth, percent.
    pub demographic_velocity: Option<f64>,
    pub biometric_velocity: Option<f64>,
    pub fatigue_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDynamics {
    pub transition: Option<TransitionPoint>,
    pub monthly_ratios: Vec<PeriodRatio>,
    pub fatigue: FatigueAnalysis,
}

pub struct DynamicsAnalyzer {
    config: DynamicsConfig,
}

impl DynamicsAnalyzer {
    pub fn new(config: DynamicsConfig) -> Self {
        Self { config }
    }

    /// First day closing a run of `sustained_days` consecutive days whose
    /// updates/enrolment ratio exceeds the dominance ratio. Days with zero
    /// enrolment break the run.
    pub fn transition_point(&self, daily: &RollupSeries) -> Option<TransitionPoint> {
        let needed = self.config.sustained_days.max(1);
        let mut run = 0usize;
        for (index, row) in daily.rows.iter().enumerate() {
            match row.totals.updates_to_enrolment() {
                Some(ratio) if ratio > self.config.dominance_ratio => {
                    run += 1;
                    if run >= needed {
                        return Some(TransitionPoint {
                            period: row.key.clone(),
                            index,
                            ratio,
                        });
                    }
                }
                _ => run = 0,
            }
        }
        None
    }

    pub fn fatigue(&self, monthly: &RollupSeries) -> FatigueAnalysis {
        let declining = |growth: fn(&GrowthRates) -> Option<f64>| -> Vec<RollupKey> {
            monthly
                .rows
                .iter()
                .filter(|r| growth(&r.growth).is_some_and(|g| g < 0.0))
                .map(|r| r.key.clone())
                .collect()
        };
        let velocity = |growth: fn(&GrowthRates) -> Option<f64>| -> Option<f64> {
            let values: Vec<f64> = monthly.rows.iter().filter_map(|r| growth(&r.growth)).collect();
            mean(&values)
        };

        let demographic_velocity = velocity(|g| g.demographic_updates);
        let biometric_velocity = velocity(|g| g.biometric_updates);
        FatigueAnalysis {
            demographic_decline_months: declining(|g| g.demographic_updates),
            biometric_decline_months: declining(|g| g.biometric_updates),
            fatigue_detected: demographic_velocity.is_some_and(|v| v < 0.0)
                || biometric_velocity.is_some_and(|v| v < 0.0),
            demographic_velocity,
            biometric_velocity,
        }
    }

    pub fn analyze(&self, daily: &RollupSeries, monthly: &RollupSeries) -> UpdateDynamics {
        let transition = self.transition_point(daily);
        let fatigue = self.fatigue(monthly);
        debug!(
            "Update dynamics: transition {:?}, fatigue {}",
            transition.as_ref().map(|t| t.period.to_string()),
            fatigue.fatigue_detected
        );
        UpdateDynamics {
            transition,
            monthly_ratios: monthly
                .rows
                .iter()
                .map(|r| PeriodRatio {
                    period: r.key.clone(),
                    updates_to_enrolment: r.totals.updates_to_enrolment(),
                })
                .collect(),
            fatigue,
        }
    }
}

impl Default for DynamicsAnalyzer {
    fn default() -> Self {
        Self::new(DynamicsConfig::default())
    }
}
