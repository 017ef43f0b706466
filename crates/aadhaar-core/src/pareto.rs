use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, Result};
use crate::models::{CategoryTotals, RollupKey, RollupSeries};

/// Thresholds for the 80/20 analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParetoConfig {
    /// Groups whose cumulative share stays at or below this are the vital few.
    pub cumulative_threshold_pct: f64,
    /// The distribution follows the rule when the vital few are at most this
    /// share of all groups.
    pub vital_share_limit_pct: f64,
}

impl Default for ParetoConfig {
    fn default() -> Self {
        Self {
            cumulative_threshold_pct: 80.0,
            vital_share_limit_pct: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoEntry {
    pub key: RollupKey,
    pub value: u64,
    pub share_pct: f64,
    pub cumulative: u64,
    pub cumulative_pct: f64,
    pub vital: bool,
}

/// Groups sorted by contribution with their cumulative share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoAnalysis {
    pub total: u64,
    pub groups: usize,
    pub vital_few: usize,
    pub vital_few_pct: f64,
    pub follows_pareto_rule: bool,
    pub entries: Vec<ParetoEntry>,
}

impl ParetoAnalysis {
    pub fn vital_entries(&self) -> impl Iterator<Item = &ParetoEntry> {
        self.entries.iter().filter(|e| e.vital)
    }
}

pub struct ParetoAnalyzer {
    config: ParetoConfig,
}

impl ParetoAnalyzer {
    pub fn new(config: ParetoConfig) -> Self {
        Self { config }
    }

    /// Rank `groups` by value (descending, ties in input order) and mark the
    /// vital few. A zero total is insufficient data.
    pub fn analyze(&self, groups: Vec<(RollupKey, u64)>) -> Result<ParetoAnalysis> {
        let total: u64 = groups.iter().map(|(_, v)| v).sum();
        if total == 0 {
            return Err(AnalyticsError::insufficient(
                "pareto analysis (non-zero total)",
                1,
                0,
            ));
        }

        let mut groups = groups;
        groups.sort_by(|a, b| b.1.cmp(&a.1));

        let mut cumulative = 0u64;
        let entries: Vec<ParetoEntry> = groups
            .into_iter()
            .map(|(key, value)| {
                cumulative += value;
                let cumulative_pct = cumulative as f64 * 100.0 / total as f64;
                ParetoEntry {
                    key,
                    value,
                    share_pct: value as f64 * 100.0 / total as f64,
                    cumulative,
                    cumulative_pct,
                    vital: cumulative_pct <= self.config.cumulative_threshold_pct,
                }
            })
            .collect();

        let vital_few = entries.iter().filter(|e| e.vital).count();
        let vital_few_pct = vital_few as f64 / entries.len() as f64 * 100.0;
        debug!(
            "Pareto: {} of {} groups carry {}% of volume",
            vital_few,
            entries.len(),
            self.config.cumulative_threshold_pct
        );

        Ok(ParetoAnalysis {
            total,
            groups: entries.len(),
            vital_few,
            vital_few_pct,
            follows_pareto_rule: vital_few_pct <= self.config.vital_share_limit_pct,
            entries,
        })
    }

    /// Pareto table of a rollup series under the given measure.
    pub fn analyze_series(
        &self,
        series: &RollupSeries,
        measure: impl Fn(&CategoryTotals) -> u64,
    ) -> Result<ParetoAnalysis> {
        self.analyze(
            series
                .rows
                .iter()
                .map(|r| (r.key.clone(), measure(&r.totals)))
                .collect(),
        )
    }
}

impl Default for ParetoAnalyzer {
    fn default() -> Self {
        Self::new(ParetoConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str) -> RollupKey {
        RollupKey::State(name.to_string())
    }

    fn skewed() -> Vec<(RollupKey, u64)> {
        vec![
            (state("C"), 50),
            (state("A"), 500),
            (state("E"), 10),
            (state("B"), 300),
            (state("D"), 40),
            (state("F"), 10),
            (state("G"), 10),
            (state("H"), 10),
            (state("I"), 10),
            (state("J"), 10),
            (state("K"), 10),
            (state("L"), 10),
        ]
    }

    #[test]
    fn test_cumulative_pct_monotone_and_ends_at_100() {
        let analysis = ParetoAnalyzer::default().analyze(skewed()).unwrap();
        let pcts: Vec<f64> = analysis.entries.iter().map(|e| e.cumulative_pct).collect();
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*pcts.last().unwrap(), 100.0);
        assert_eq!(analysis.total, 1000);
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let analysis = ParetoAnalyzer::default().analyze(skewed()).unwrap();
        assert_eq!(analysis.entries[0].key, state("A"));
        assert_eq!(analysis.entries[1].key, state("B"));
        // the 10s keep input order
        let tail: Vec<String> = analysis.entries[4..]
            .iter()
            .map(|e| e.key.to_string())
            .collect();
        assert_eq!(tail, vec!["E", "F", "G", "H", "I", "J", "K", "L"]);
    }

    #[test]
    fn test_vital_few_and_rule() {
        let analysis = ParetoAnalyzer::default().analyze(skewed()).unwrap();
        // A = 50%, A+B = 80%, +C = 85%
        assert_eq!(analysis.vital_few, 2);
        assert_eq!(analysis.vital_entries().count(), 2);
        assert!((analysis.vital_few_pct - 200.0 / 12.0).abs() < 1e-9);
        assert!(analysis.follows_pareto_rule);
    }

    #[test]
    fn test_even_distribution_does_not_follow_rule() {
        let groups = (0..5).map(|i| (RollupKey::Year(2020 + i), 100)).collect();
        let analysis = ParetoAnalyzer::default().analyze(groups).unwrap();
        assert_eq!(analysis.vital_few, 4);
        assert!(!analysis.follows_pareto_rule);
    }

    #[test]
    fn test_zero_total_is_insufficient() {
        let groups = vec![(state("A"), 0), (state("B"), 0)];
        let err = ParetoAnalyzer::default().analyze(groups).unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientData { .. }));
        assert!(ParetoAnalyzer::default().analyze(vec![]).is_err());
    }
}
