//! Volume rollups over time periods and geographies.
//!
//! Every rollup is a pure function of the unified tables: group keys come
//! from a key function, counters are summed per category into a
//! [`BTreeMap`] so rows come out unique and ascending.

use std::collections::BTreeMap;

use aadhaar_core::models::{
    Category, CategoryTotals, Granularity, GrowthRates, Record, RollupKey, RollupRow,
    RollupSeries, TemporalFeatures,
};
use aadhaar_core::stats::{dense_rank_desc, pct_change};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::UnifiedDataset;

// ── Volume measures ───────────────────────────────────────────────────────────

/// Grand total of one age-banded counter column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeBandTotal {
    pub category: Category,
    pub column: String,
    pub total: u64,
}

/// Dataset-wide volumes, dated and undated records alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeasures {
    pub age_bands: Vec<AgeBandTotal>,
    pub totals: CategoryTotals,
    pub total_updates: u64,
    pub total_operations: u64,
    pub demographic_to_enrolment: Option<f64>,
    pub biometric_to_enrolment: Option<f64>,
    pub updates_to_enrolment: Option<f64>,
    /// `(enrolments + weight × updates) / scale`.
    pub operational_load_index: f64,
}

// ── Regional measures ─────────────────────────────────────────────────────────

/// One state or district with its stress score and dense ranks (1 = highest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalMeasure {
    pub key: RollupKey,
    pub totals: CategoryTotals,
    /// Updates per enrolment; `None` for zero enrolments.
    pub stress_score: Option<f64>,
    pub enrolment_rank: Option<usize>,
    pub update_rank: Option<usize>,
    pub stress_rank: Option<usize>,
}

/// Every rollup of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollups {
    pub daily: RollupSeries,
    pub monthly: RollupSeries,
    pub yearly: RollupSeries,
    pub states: RollupSeries,
    pub districts: RollupSeries,
}

// ── RollupEngine ──────────────────────────────────────────────────────────────

/// Stateless helper that groups unified records by period or region.
pub struct RollupEngine;

impl RollupEngine {
    /// Totals per parsed calendar day.
    pub fn daily(dataset: &UnifiedDataset) -> RollupSeries {
        let mut series = Self::rollup(dataset, Granularity::Day, |_, t| {
            t.map(|t| RollupKey::Day(t.date))
        });
        Self::attach_growth(&mut series);
        series
    }

    /// Totals per `YYYY-MM` bucket, with growth and acceleration.
    pub fn monthly(dataset: &UnifiedDataset) -> RollupSeries {
        let mut series = Self::rollup(dataset, Granularity::Month, |_, t| {
            t.map(|t| RollupKey::Month {
                year: t.year,
                month: t.month,
            })
        });
        Self::attach_growth(&mut series);
        Self::attach_acceleration(&mut series);
        series
    }

    pub fn yearly(dataset: &UnifiedDataset) -> RollupSeries {
        let mut series = Self::rollup(dataset, Granularity::Year, |_, t| {
            t.map(|t| RollupKey::Year(t.year))
        });
        Self::attach_growth(&mut series);
        series
    }

    /// Totals per state. Undated records are included.
    pub fn by_state(dataset: &UnifiedDataset) -> RollupSeries {
        Self::rollup(dataset, Granularity::State, |r, _| {
            Some(RollupKey::State(r.state.clone()))
        })
    }

    /// Totals per (state, district). Undated records are included.
    pub fn by_district(dataset: &UnifiedDataset) -> RollupSeries {
        Self::rollup(dataset, Granularity::District, |r, _| {
            Some(RollupKey::District {
                state: r.state.clone(),
                district: r.district.clone(),
            })
        })
    }

    pub fn all(dataset: &UnifiedDataset) -> Rollups {
        Rollups {
            daily: Self::daily(dataset),
            monthly: Self::monthly(dataset),
            yearly: Self::yearly(dataset),
            states: Self::by_state(dataset),
            districts: Self::by_district(dataset),
        }
    }

    /// Sum of every record of every table.
    pub fn grand_totals(dataset: &UnifiedDataset) -> CategoryTotals {
        let mut totals = CategoryTotals::default();
        for table in dataset.tables() {
            for row in &table.rows {
                totals.add(table.category, row.record.total());
            }
        }
        totals
    }

    pub fn volume_measures(
        dataset: &UnifiedDataset,
        update_weight: f64,
        scale: f64,
    ) -> VolumeMeasures {
        let mut age_bands = Vec::new();
        for table in dataset.tables() {
            let columns = table.category.counter_columns();
            let mut sums = vec![0u64; columns.len()];
            for row in &table.rows {
                for (sum, value) in sums.iter_mut().zip(&row.record.counters) {
                    *sum += value;
                }
            }
            age_bands.extend(columns.iter().zip(sums).map(|(column, total)| AgeBandTotal {
                category: table.category,
                column: column.to_string(),
                total,
            }));
        }

        let totals = Self::grand_totals(dataset);
        VolumeMeasures {
            age_bands,
            total_updates: totals.total_updates(),
            total_operations: totals.total_operations(),
            demographic_to_enrolment: totals.demographic_to_enrolment(),
            biometric_to_enrolment: totals.biometric_to_enrolment(),
            updates_to_enrolment: totals.updates_to_enrolment(),
            operational_load_index: (totals.enrolments as f64
                + update_weight * totals.total_updates() as f64)
                / scale,
            totals,
        }
    }

    /// Stress scores and dense ranks for a state or district rollup.
    pub fn regional_measures(series: &RollupSeries) -> Vec<RegionalMeasure> {
        let stress: Vec<Option<f64>> = series
            .rows
            .iter()
            .map(|r| r.totals.updates_to_enrolment())
            .collect();
        let volume = |measure: fn(&CategoryTotals) -> u64| -> Vec<Option<f64>> {
            series
                .rows
                .iter()
                .map(|r| Some(measure(&r.totals) as f64))
                .collect()
        };
        let enrol_ranks = dense_rank_desc(&volume(|t| t.enrolments));
        let update_ranks = dense_rank_desc(&volume(|t| t.total_updates()));
        let stress_ranks = dense_rank_desc(&stress);

        series
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| RegionalMeasure {
                key: row.key.clone(),
                totals: row.totals,
                stress_score: stress[i],
                enrolment_rank: enrol_ranks[i],
                update_rank: update_ranks[i],
                stress_rank: stress_ranks[i],
            })
            .collect()
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Generic grouping driver. Records for which `key_fn` returns `None`
    /// are left out.
    fn rollup(
        dataset: &UnifiedDataset,
        granularity: Granularity,
        key_fn: impl Fn(&Record, Option<&TemporalFeatures>) -> Option<RollupKey>,
    ) -> RollupSeries {
        let mut map: BTreeMap<RollupKey, CategoryTotals> = BTreeMap::new();
        let mut skipped = 0usize;

        for table in dataset.tables() {
            for row in &table.rows {
                match key_fn(&row.record, row.temporal.as_ref()) {
                    Some(key) => map
                        .entry(key)
                        .or_default()
                        .add(table.category, row.record.total()),
                    None => skipped += 1,
                }
            }
        }

        debug!(
            "{:?} rollup: {} groups, {} records without a key",
            granularity,
            map.len(),
            skipped
        );

        RollupSeries {
            granularity,
            rows: map
                .into_iter()
                .map(|(key, totals)| RollupRow::new(key, totals))
                .collect(),
        }
    }

    fn attach_growth(series: &mut RollupSeries) {
        let change = |prev: u64, cur: u64| pct_change(prev as f64, cur as f64);
        for i in 1..series.rows.len() {
            let prev = series.rows[i - 1].totals;
            let cur = series.rows[i].totals;
            series.rows[i].growth = GrowthRates {
                enrolments: change(prev.enrolments, cur.enrolments),
                demographic_updates: change(prev.demographic_updates, cur.demographic_updates),
                biometric_updates: change(prev.biometric_updates, cur.biometric_updates),
                operations: change(prev.total_operations(), cur.total_operations()),
            };
        }
    }

    fn attach_acceleration(series: &mut RollupSeries) {
        let diff = |prev: Option<f64>, cur: Option<f64>| Some(cur? - prev?);
        for i in 1..series.rows.len() {
            let prev = series.rows[i - 1].growth;
            let cur = series.rows[i].growth;
            series.rows[i].acceleration = GrowthRates {
                enrolments: diff(prev.enrolments, cur.enrolments),
                demographic_updates: diff(prev.demographic_updates, cur.demographic_updates),
                biometric_updates: diff(prev.biometric_updates, cur.biometric_updates),
                operations: diff(prev.operations, cur.operations),
            };
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aadhaar_core::models::RecordTable;
    use aadhaar_core::temporal::TemporalDeriver;
    use chrono::NaiveDate;

    fn record(date: &str, state: &str, district: &str, counters: &[u64]) -> Record {
        Record {
            date: date.to_string(),
            state: state.to_string(),
            district: district.to_string(),
            pincode: "000000".to_string(),
            counters: counters.to_vec(),
        }
    }

    fn table(category: Category, records: Vec<Record>) -> RecordTable {
        RecordTable {
            category,
            columns: vec![],
            records,
        }
    }

    fn dataset() -> UnifiedDataset {
        let d = TemporalDeriver::default();
        UnifiedDataset::new(
            d.derive_table(table(
                Category::Enrolment,
                vec![
                    record("01-01-2025", "Bihar", "Patna", &[10, 5, 5]),
                    record("02-01-2025", "Bihar", "Gaya", &[5, 5, 0]),
                    record("01-02-2025", "Goa", "North Goa", &[2, 2, 1]),
                    record("unknown", "Goa", "South Goa", &[1, 1, 1]),
                ],
            )),
            d.derive_table(table(
                Category::Demographic,
                vec![
                    record("01-01-2025", "Bihar", "Patna", &[20, 20]),
                    record("01-02-2025", "Goa", "North Goa", &[5, 5]),
                ],
            )),
            d.derive_table(table(
                Category::Biometric,
                vec![
                    record("02-01-2025", "Bihar", "Gaya", &[7, 3]),
                    record("03-03-2025", "Kerala", "Kollam", &[4, 0]),
                ],
            )),
        )
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── time rollups ──────────────────────────────────────────────────────────

    #[test]
    fn test_daily_groups_and_excludes_undated() {
        let daily = RollupEngine::daily(&dataset());
        assert_eq!(daily.granularity, Granularity::Day);
        assert_eq!(
            daily.keys(),
            vec![
                RollupKey::Day(ymd(2025, 1, 1)),
                RollupKey::Day(ymd(2025, 1, 2)),
                RollupKey::Day(ymd(2025, 2, 1)),
                RollupKey::Day(ymd(2025, 3, 3)),
            ]
        );
        let first = daily.rows[0].totals;
        assert_eq!(first.enrolments, 20);
        assert_eq!(first.demographic_updates, 40);
        assert_eq!(first.biometric_updates, 0);
        // the undated enrolment row (3) is missing from every day
        assert_eq!(daily.totals().enrolments, 20 + 10 + 5);
    }

    #[test]
    fn test_daily_growth() {
        let daily = RollupEngine::daily(&dataset());
        assert_eq!(daily.rows[0].growth, GrowthRates::default());
        // 60 -> 20 operations
        let g = daily.rows[1].growth;
        assert!((g.operations.unwrap() - (-200.0 / 3.0)).abs() < 1e-9);
        assert_eq!(g.enrolments, Some(-50.0));
        // previous biometric was zero
        assert_eq!(g.biometric_updates, None);
    }

    #[test]
    fn test_monthly_growth_and_acceleration() {
        let monthly = RollupEngine::monthly(&dataset());
        assert_eq!(
            monthly.keys(),
            vec![
                RollupKey::Month { year: 2025, month: 1 },
                RollupKey::Month { year: 2025, month: 2 },
                RollupKey::Month { year: 2025, month: 3 },
            ]
        );
        let ops = monthly.operations();
        assert_eq!(ops, vec![80.0, 15.0, 4.0]);
        let g1 = monthly.rows[1].growth.operations.unwrap();
        let g2 = monthly.rows[2].growth.operations.unwrap();
        assert!((g1 - (-81.25)).abs() < 1e-9);
        assert!((g2 - (4.0 - 15.0) / 15.0 * 100.0).abs() < 1e-9);
        assert!(monthly.rows[1].acceleration.operations.is_none());
        let a2 = monthly.rows[2].acceleration.operations.unwrap();
        assert!((a2 - (g2 - g1)).abs() < 1e-9);
    }

    #[test]
    fn test_yearly_single_group() {
        let yearly = RollupEngine::yearly(&dataset());
        assert_eq!(yearly.keys(), vec![RollupKey::Year(2025)]);
        assert_eq!(yearly.rows[0].total_operations(), 99);
    }

    // ── geography rollups ─────────────────────────────────────────────────────

    #[test]
    fn test_geography_includes_undated_records() {
        let data = dataset();
        let states = RollupEngine::by_state(&data);
        assert_eq!(
            states.keys(),
            vec![
                RollupKey::State("Bihar".into()),
                RollupKey::State("Goa".into()),
                RollupKey::State("Kerala".into()),
            ]
        );
        assert_eq!(states.rows[1].totals.enrolments, 5 + 3);
        assert!(states.rows.iter().all(|r| r.growth == GrowthRates::default()));

        let districts = RollupEngine::by_district(&data);
        assert_eq!(districts.len(), 5);
        assert!(districts
            .keys()
            .contains(&RollupKey::District {
                state: "Goa".into(),
                district: "South Goa".into()
            }));
    }

    #[test]
    fn test_group_totals_sum_to_grand_total() {
        let data = dataset();
        let grand = RollupEngine::grand_totals(&data);
        assert_eq!(RollupEngine::by_state(&data).totals(), grand);
        assert_eq!(RollupEngine::by_district(&data).totals(), grand);
        // time rollups agree with each other
        let daily = RollupEngine::daily(&data).totals();
        assert_eq!(RollupEngine::monthly(&data).totals(), daily);
        assert_eq!(RollupEngine::yearly(&data).totals(), daily);
        assert_eq!(grand.enrolments - daily.enrolments, 3);
    }

    // ── measures ──────────────────────────────────────────────────────────────

    #[test]
    fn test_volume_measures() {
        let v = RollupEngine::volume_measures(&dataset(), 1.5, 1000.0);
        assert_eq!(v.totals.enrolments, 38);
        assert_eq!(v.total_updates, 50 + 14);
        assert_eq!(v.total_operations, 38 + 64);
        assert_eq!(v.age_bands.len(), 7);
        assert_eq!(v.age_bands[0].column, "age_0_5");
        assert_eq!(v.age_bands[0].total, 18);
        assert_eq!(v.age_bands[3].category, Category::Demographic);
        assert_eq!(v.age_bands[3].total, 25);
        assert!((v.operational_load_index - (38.0 + 1.5 * 64.0) / 1000.0).abs() < 1e-12);
        assert!((v.updates_to_enrolment.unwrap() - 64.0 / 38.0).abs() < 1e-12);
    }

    #[test]
    fn test_regional_measures_ranks() {
        let states = RollupEngine::by_state(&dataset());
        let measures = RollupEngine::regional_measures(&states);
        let bihar = &measures[0];
        let goa = &measures[1];
        let kerala = &measures[2];

        assert_eq!(bihar.enrolment_rank, Some(1));
        assert_eq!(goa.enrolment_rank, Some(2));
        assert_eq!(kerala.enrolment_rank, Some(3));
        // Bihar 50 updates / 30 enrolments, Goa 10 / 8
        assert_eq!(bihar.update_rank, Some(1));
        assert_eq!(bihar.stress_rank, Some(1));
        assert_eq!(goa.stress_rank, Some(2));
        // no enrolments in Kerala
        assert!(kerala.stress_score.is_none());
        assert!(kerala.stress_rank.is_none());
    }

    #[test]
    fn test_empty_dataset_rollups() {
        let d = TemporalDeriver::default();
        let empty = UnifiedDataset::new(
            d.derive_table(table(Category::Enrolment, vec![])),
            d.derive_table(table(Category::Demographic, vec![])),
            d.derive_table(table(Category::Biometric, vec![])),
        );
        let rollups = RollupEngine::all(&empty);
        assert!(rollups.daily.is_empty());
        assert!(rollups.districts.is_empty());
        let v = RollupEngine::volume_measures(&empty, 1.5, 1000.0);
        assert_eq!(v.operational_load_index, 0.0);
        assert!(v.updates_to_enrolment.is_none());
    }
}
