use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, Result};
use crate::stats::pearson_test;

// ── LeadLagConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadLagConfig {
    /// Lags from `-max_lag` to `+max_lag` are tested.
    pub max_lag: usize,
    /// Two-tailed p-value below which a correlation is significant.
    pub significance: f64,
    /// Lags (periods) tested for predictive power of past updates.
    pub predictive_lags: Vec<usize>,
    /// Predictive lags need more than this many rows after the warm-up.
    pub min_predictive_rows: usize,
    pub strong_threshold: f64,
    pub moderate_threshold: f64,
}

impl Default for LeadLagConfig {
    fn default() -> Self {
        Self {
            max_lag: 7,
            significance: 0.05,
            predictive_lags: vec![1, 2, 3, 7],
            min_predictive_rows: 10,
            strong_threshold: 0.7,
            moderate_threshold: 0.4,
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Correlation at one lag over the overlapping window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagCorrelation {
    pub lag: i64,
    pub r: f64,
    pub p_value: f64,
    /// Overlapping observations.
    pub n: usize,
    pub significant: bool,
}

/// Which series moves first at the strongest lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadDirection {
    /// Negative lag: the first series leads.
    LeaderFirst,
    /// Positive lag: the second series leads.
    FollowerFirst,
    Contemporaneous,
}

impl LeadDirection {
    pub fn from_lag(lag: i64) -> Self {
        match lag {
            l if l < 0 => LeadDirection::LeaderFirst,
            l if l > 0 => LeadDirection::FollowerFirst,
            _ => LeadDirection::Contemporaneous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadLagResult {
    /// Every computable lag, ascending.
    pub correlations: Vec<LagCorrelation>,
    /// The lag with the largest `|r|`.
    pub strongest: LagCorrelation,
    pub direction: LeadDirection,
}

impl LeadLagResult {
    pub fn at_lag(&self, lag: i64) -> Option<&LagCorrelation> {
        self.correlations.iter().find(|c| c.lag == lag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

/// Same-period correlation with a strength label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContemporaneousCorrelation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
    pub strength: Strength,
}

// ── Windows ───────────────────────────────────────────────────────────────────

/// Overlapping slices of `a` shifted by `lag` against `b`.
///
/// Negative lag pairs `a[t]` with `b[t + |lag|]` (a leads); positive lag
/// pairs `a[t + lag]` with `b[t]` (b leads).
pub fn lag_window<'a>(a: &'a [f64], b: &'a [f64], lag: i64) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    let shift = lag.unsigned_abs() as usize;
    if shift >= n {
        return (&[], &[]);
    }
    if lag < 0 {
        (&a[..n - shift], &b[shift..n])
    } else {
        (&a[shift..n], &b[..n - shift])
    }
}

// ── LeadLagAnalyzer ───────────────────────────────────────────────────────────

pub struct LeadLagAnalyzer {
    config: LeadLagConfig,
}

impl LeadLagAnalyzer {
    pub fn new(config: LeadLagConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LeadLagConfig {
        &self.config
    }

    fn correlate(&self, a: &[f64], b: &[f64], lag: i64) -> Option<LagCorrelation> {
        let c = pearson_test(a, b)?;
        Some(LagCorrelation {
            lag,
            r: c.r,
            p_value: c.p_value,
            n: c.n,
            significant: c.p_value < self.config.significance,
        })
    }

    /// Correlate `leader` against `follower` at every lag in
    /// `[-max_lag, max_lag]`. Lags with fewer than two overlapping points or
    /// a constant window are skipped.
    pub fn cross_correlate(&self, leader: &[f64], follower: &[f64]) -> Result<LeadLagResult> {
        let max_lag = self.config.max_lag as i64;
        let correlations: Vec<LagCorrelation> = (-max_lag..=max_lag)
            .filter_map(|lag| {
                let (a, b) = lag_window(leader, follower, lag);
                self.correlate(a, b, lag)
            })
            .collect();

        let strongest = correlations
            .iter()
            .copied()
            .fold(None::<LagCorrelation>, |best, c| match best {
                Some(b) if b.r.abs() >= c.r.abs() => Some(b),
                _ => Some(c),
            })
            .ok_or_else(|| {
                AnalyticsError::insufficient(
                    "lead-lag correlation",
                    2,
                    leader.len().min(follower.len()),
                )
            })?;

        debug!(
            "Lead-lag: {} lags computed, strongest r={:.3} at lag {}",
            correlations.len(),
            strongest.r,
            strongest.lag
        );

        Ok(LeadLagResult {
            direction: LeadDirection::from_lag(strongest.lag),
            strongest,
            correlations,
        })
    }

    pub fn strength(&self, r: f64) -> Strength {
        let r = r.abs();
        if r > self.config.strong_threshold {
            Strength::Strong
        } else if r > self.config.moderate_threshold {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    /// Same-period correlation of two series; needs more than two points.
    pub fn contemporaneous(&self, a: &[f64], b: &[f64]) -> Result<ContemporaneousCorrelation> {
        let n = a.len().min(b.len());
        if n <= 2 {
            return Err(AnalyticsError::insufficient("contemporaneous correlation", 3, n));
        }
        let c = pearson_test(&a[..n], &b[..n]).ok_or_else(|| {
            AnalyticsError::insufficient("contemporaneous correlation (non-constant)", 3, 0)
        })?;
        Ok(ContemporaneousCorrelation {
            r: c.r,
            p_value: c.p_value,
            n: c.n,
            strength: self.strength(c.r),
        })
    }

    /// Correlate past `updates` with current `load` at each predictive lag.
    ///
    /// All lags share one window: the rows after the first `max(lags)`
    /// warm-up rows, of which there must be more than `min_predictive_rows`.
    pub fn predictive_lags(&self, updates: &[f64], load: &[f64]) -> Result<Vec<LagCorrelation>> {
        let n = updates.len().min(load.len());
        let warmup = self.config.predictive_lags.iter().copied().max().unwrap_or(0);
        let rows = n.saturating_sub(warmup);
        if rows <= self.config.min_predictive_rows {
            return Err(AnalyticsError::insufficient(
                "predictive lag correlation",
                self.config.min_predictive_rows + 1,
                rows,
            ));
        }

        let current = &load[warmup..n];
        Ok(self
            .config
            .predictive_lags
            .iter()
            .filter_map(|&lag| {
                let past = &updates[warmup - lag..n - lag];
                self.correlate(past, current, lag as i64)
            })
            .collect())
    }
}

impl Default for LeadLagAnalyzer {
    fn default() -> Self {
        Self::new(LeadLagConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 40.0 * ((i as f64) * 0.7).sin() + (i % 3) as f64 * 5.0)
            .collect()
    }

    #[test]
    fn test_lag_window_shapes() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [10.0, 20.0, 30.0, 40.0, 50.0];
        let (x, y) = lag_window(&a, &b, -2);
        assert_eq!(x, &[1.0, 2.0, 3.0]);
        assert_eq!(y, &[30.0, 40.0, 50.0]);
        let (x, y) = lag_window(&a, &b, 2);
        assert_eq!(x, &[3.0, 4.0, 5.0]);
        assert_eq!(y, &[10.0, 20.0, 30.0]);
        let (x, _) = lag_window(&a, &b, 5);
        assert!(x.is_empty());
    }

    #[test]
    fn test_identical_series_lag_zero_is_one() {
        let a = wave(40);
        let result = LeadLagAnalyzer::default().cross_correlate(&a, &a).unwrap();
        let zero = result.at_lag(0).unwrap();
        assert!((zero.r - 1.0).abs() < 1e-9);
        assert!(zero.significant);
        assert_eq!(result.strongest.lag, 0);
        assert_eq!(result.direction, LeadDirection::Contemporaneous);
        assert_eq!(result.correlations.len(), 15);
    }

    #[test]
    fn test_leading_series_detected_at_negative_lag() {
        let leader = wave(60);
        // follower[t] = leader[t - 3]
        let mut follower = vec![0.0; 3];
        follower.extend_from_slice(&leader[..57]);
        let result = LeadLagAnalyzer::default()
            .cross_correlate(&leader, &follower)
            .unwrap();
        assert_eq!(result.strongest.lag, -3);
        assert!((result.strongest.r - 1.0).abs() < 1e-9);
        assert_eq!(result.direction, LeadDirection::LeaderFirst);
    }

    #[test]
    fn test_constant_series_is_insufficient() {
        let flat = vec![5.0; 20];
        let err = LeadLagAnalyzer::default()
            .cross_correlate(&flat, &wave(20))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientData { .. }));
    }

    #[test]
    fn test_short_series_skips_wide_lags() {
        let a = [1.0, 3.0, 2.0, 5.0];
        let b = [2.0, 1.0, 4.0, 3.0];
        let result = LeadLagAnalyzer::default().cross_correlate(&a, &b).unwrap();
        // lags with fewer than two overlapping points are dropped
        assert!(result.correlations.iter().all(|c| c.lag.abs() <= 2));
        assert!(result.correlations.iter().all(|c| c.n >= 2));
    }

    #[test]
    fn test_strength_labels() {
        let analyzer = LeadLagAnalyzer::default();
        assert_eq!(analyzer.strength(0.85), Strength::Strong);
        assert_eq!(analyzer.strength(-0.75), Strength::Strong);
        assert_eq!(analyzer.strength(0.5), Strength::Moderate);
        assert_eq!(analyzer.strength(0.4), Strength::Weak);
    }

    #[test]
    fn test_contemporaneous_needs_three_points() {
        let analyzer = LeadLagAnalyzer::default();
        assert!(analyzer.contemporaneous(&[1.0, 2.0], &[2.0, 4.0]).is_err());
        let c = analyzer
            .contemporaneous(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0])
            .unwrap();
        assert_eq!(c.strength, Strength::Strong);
    }

    #[test]
    fn test_predictive_lags_requires_rows() {
        let analyzer = LeadLagAnalyzer::default();
        let short = wave(17);
        assert!(analyzer.predictive_lags(&short, &short).is_err());
        let long = wave(18);
        let lags = analyzer.predictive_lags(&long, &long).unwrap();
        let tested: Vec<i64> = lags.iter().map(|c| c.lag).collect();
        assert_eq!(tested, vec![1, 2, 3, 7]);
        assert!(lags.iter().all(|c| c.n == 11));
    }

    #[test]
    fn test_predictive_lag_picks_true_delay() {
        let updates = wave(50);
        // load[t] = updates[t - 2]
        let mut load = vec![100.0, 100.0];
        load.extend_from_slice(&updates[..48]);
        let lags = LeadLagAnalyzer::default()
            .predictive_lags(&updates, &load)
            .unwrap();
        let two = lags.iter().find(|c| c.lag == 2).unwrap();
        assert!((two.r - 1.0).abs() < 1e-9);
        assert!(two.significant);
    }
}
