use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalyticsError;

/// Key columns every record family must carry.
pub const REQUIRED_COMMON_COLUMNS: [&str; 4] = ["date", "state", "district", "pincode"];

/// Names of the temporal columns the deriver adds to every unified table.
pub const DERIVED_TEMPORAL_COLUMNS: [&str; 5] = ["Date", "Year", "Month", "Quarter", "Month_Year"];

/// The three record families published in the extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// First-time identity registrations.
    Enrolment,
    /// Corrections to name, address and other demographic fields.
    Demographic,
    /// Fingerprint, iris and photo refreshes.
    Biometric,
}

impl Category {
    /// All categories in canonical order.
    pub const ALL: [Category; 3] = [
        Category::Enrolment,
        Category::Demographic,
        Category::Biometric,
    ];

    /// The canonical lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Enrolment => "enrolment",
            Category::Demographic => "demographic",
            Category::Biometric => "biometric",
        }
    }

    /// Age-banded counter columns carried by this category, in file order.
    pub fn counter_columns(&self) -> &'static [&'static str] {
        match self {
            Category::Enrolment => &["age_0_5", "age_5_17", "age_18_greater"],
            Category::Demographic => &["demo_age_5_17", "demo_age_17_"],
            Category::Biometric => &["bio_age_5_17", "bio_age_17_"],
        }
    }

    /// Every column a raw table of this category must contain.
    pub fn required_columns(&self) -> Vec<&'static str> {
        REQUIRED_COMMON_COLUMNS
            .iter()
            .copied()
            .chain(self.counter_columns().iter().copied())
            .collect()
    }
}

impl FromStr for Category {
    type Err = AnalyticsError;

    /// Case-insensitive; accepts the common spellings seen in file names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "enrolment" | "enrollment" | "enrol" => Ok(Category::Enrolment),
            "demographic" | "demo" => Ok(Category::Demographic),
            "biometric" | "bio" => Ok(Category::Biometric),
            other => Err(AnalyticsError::InvalidCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One row of an extract. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The date exactly as it appeared in the file.
    pub date: String,
    pub state: String,
    pub district: String,
    pub pincode: String,
    /// Counter values in [`Category::counter_columns`] order.
    pub counters: Vec<u64>,
}

impl Record {
    /// Sum of all age-banded counters on this row.
    pub fn total(&self) -> u64 {
        self.counters.iter().sum()
    }
}

/// Calendar attributes derived from a parsed record date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    /// Calendar quarter, 1–4.
    pub quarter: u32,
    /// `"YYYY-MM"` bucket used for monthly grouping.
    pub month_bucket: String,
}

/// A record paired with its derived temporal attributes (`None` when the
/// date could not be parsed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub record: Record,
    pub temporal: Option<TemporalFeatures>,
}

/// Concatenated records of one category, in the schema's column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTable {
    pub category: Category,
    /// Column names of the concatenated table.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// The canonical table of one category after temporal derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedTable {
    pub category: Category,
    /// Source columns followed by [`DERIVED_TEMPORAL_COLUMNS`].
    pub columns: Vec<String>,
    pub rows: Vec<UnifiedRecord>,
    /// Number of rows whose date could not be parsed.
    pub unparsed_dates: usize,
}

impl UnifiedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that carry parsed temporal features.
    pub fn dated_rows(&self) -> impl Iterator<Item = (&Record, &TemporalFeatures)> {
        self.rows
            .iter()
            .filter_map(|r| r.temporal.as_ref().map(|t| (&r.record, t)))
    }

    /// Earliest and latest parsed date, if any row has one.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.dated_rows().map(|(_, t)| t.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

// ── Totals ────────────────────────────────────────────────────────────────────

/// Divide two counts, returning `None` instead of a fabricated value when
/// the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Per-category volume totals for one group or period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub enrolments: u64,
    pub demographic_updates: u64,
    pub biometric_updates: u64,
}

impl CategoryTotals {
    /// Accumulate `amount` into the bucket for `category`.
    pub fn add(&mut self, category: Category, amount: u64) {
        match category {
            Category::Enrolment => self.enrolments += amount,
            Category::Demographic => self.demographic_updates += amount,
            Category::Biometric => self.biometric_updates += amount,
        }
    }

    /// Accumulate another set of totals.
    pub fn merge(&mut self, other: &CategoryTotals) {
        self.enrolments += other.enrolments;
        self.demographic_updates += other.demographic_updates;
        self.biometric_updates += other.biometric_updates;
    }

    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Enrolment => self.enrolments,
            Category::Demographic => self.demographic_updates,
            Category::Biometric => self.biometric_updates,
        }
    }

    /// Demographic plus biometric updates.
    pub fn total_updates(&self) -> u64 {
        self.demographic_updates + self.biometric_updates
    }

    /// Enrolments plus all updates.
    pub fn total_operations(&self) -> u64 {
        self.enrolments + self.total_updates()
    }

    pub fn demographic_to_enrolment(&self) -> Option<f64> {
        ratio(self.demographic_updates, self.enrolments)
    }

    pub fn biometric_to_enrolment(&self) -> Option<f64> {
        ratio(self.biometric_updates, self.enrolments)
    }

    /// `(demographic + biometric) / enrolment`; `None` for zero enrolments.
    pub fn updates_to_enrolment(&self) -> Option<f64> {
        ratio(self.total_updates(), self.enrolments)
    }
}

// ── Rollups ───────────────────────────────────────────────────────────────────

/// The grouping used to build a [`RollupSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
    State,
    District,
}

impl Granularity {
    /// Whether the key is a time period (as opposed to a geography).
    pub fn is_temporal(&self) -> bool {
        matches!(self, Granularity::Day | Granularity::Month | Granularity::Year)
    }
}

/// The group key of one rollup row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RollupKey {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
    State(String),
    District { state: String, district: String },
}

impl RollupKey {
    /// The calendar date for daily keys.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RollupKey::Day(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for RollupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollupKey::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            RollupKey::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            RollupKey::Year(y) => write!(f, "{}", y),
            RollupKey::State(s) => f.write_str(s),
            RollupKey::District { state, district } => write!(f, "{} - {}", state, district),
        }
    }
}

/// Period-over-period percentage changes. `None` for the first period or a
/// zero previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthRates {
    pub enrolments: Option<f64>,
    pub demographic_updates: Option<f64>,
    pub biometric_updates: Option<f64>,
    pub operations: Option<f64>,
}

/// One group of a rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRow {
    pub key: RollupKey,
    pub totals: CategoryTotals,
    /// Growth against the previous row (time series only).
    pub growth: GrowthRates,
    /// Difference of consecutive growth values (monthly series only).
    pub acceleration: GrowthRates,
}

impl RollupRow {
    pub fn new(key: RollupKey, totals: CategoryTotals) -> Self {
        Self {
            key,
            totals,
            growth: GrowthRates::default(),
            acceleration: GrowthRates::default(),
        }
    }

    pub fn total_operations(&self) -> u64 {
        self.totals.total_operations()
    }
}

/// Ordered, uniquely keyed rollup of the unified tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupSeries {
    pub granularity: Granularity,
    pub rows: Vec<RollupRow>,
}

impl RollupSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total operations per row as floats, in row order.
    pub fn operations(&self) -> Vec<f64> {
        self.values(|t| t.total_operations())
    }

    /// Total updates per row as floats, in row order.
    pub fn updates(&self) -> Vec<f64> {
        self.values(|t| t.total_updates())
    }

    /// Project a measure out of every row's totals.
    pub fn values(&self, measure: impl Fn(&CategoryTotals) -> u64) -> Vec<f64> {
        self.rows.iter().map(|r| measure(&r.totals) as f64).collect()
    }

    pub fn keys(&self) -> Vec<RollupKey> {
        self.rows.iter().map(|r| r.key.clone()).collect()
    }

    /// Sum of every row's totals.
    pub fn totals(&self) -> CategoryTotals {
        let mut totals = CategoryTotals::default();
        for row in &self.rows {
            totals.merge(&row.totals);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str_case_insensitive() {
        assert_eq!("Enrolment".parse::<Category>().unwrap(), Category::Enrolment);
        assert_eq!("DEMOGRAPHIC".parse::<Category>().unwrap(), Category::Demographic);
        assert_eq!("bio".parse::<Category>().unwrap(), Category::Biometric);
        assert!("census".parse::<Category>().is_err());
    }

    #[test]
    fn test_required_columns_include_common_and_counters() {
        let cols = Category::Biometric.required_columns();
        assert_eq!(
            cols,
            vec!["date", "state", "district", "pincode", "bio_age_5_17", "bio_age_17_"]
        );
    }

    #[test]
    fn test_ratio_zero_denominator_is_undefined() {
        let totals = CategoryTotals {
            enrolments: 0,
            demographic_updates: 30,
            biometric_updates: 20,
        };
        assert_eq!(totals.total_updates(), 50);
        assert!(totals.updates_to_enrolment().is_none());
        assert!(totals.demographic_to_enrolment().is_none());
    }

    #[test]
    fn test_ratio_defined() {
        let totals = CategoryTotals {
            enrolments: 100,
            demographic_updates: 150,
            biometric_updates: 50,
        };
        assert_eq!(totals.updates_to_enrolment(), Some(2.0));
        assert_eq!(totals.biometric_to_enrolment(), Some(0.5));
        assert_eq!(totals.total_operations(), 300);
    }

    #[test]
    fn test_rollup_key_display() {
        let day = RollupKey::Day(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(day.to_string(), "2025-03-02");
        let month = RollupKey::Month { year: 2025, month: 3 };
        assert_eq!(month.to_string(), "2025-03");
        let district = RollupKey::District {
            state: "Bihar".to_string(),
            district: "Patna".to_string(),
        };
        assert_eq!(district.to_string(), "Bihar - Patna");
    }

    #[test]
    fn test_rollup_key_month_ordering() {
        let a = RollupKey::Month { year: 2024, month: 12 };
        let b = RollupKey::Month { year: 2025, month: 1 };
        assert!(a < b);
    }

    #[test]
    fn test_unified_table_date_range_skips_unparsed() {
        let record = Record {
            date: "x".to_string(),
            state: "S".to_string(),
            district: "D".to_string(),
            pincode: "1".to_string(),
            counters: vec![1, 2, 3],
        };
        let features = |d: NaiveDate| TemporalFeatures {
            date: d,
            year: 2025,
            month: 1,
            quarter: 1,
            month_bucket: "2025-01".to_string(),
        };
        let table = UnifiedTable {
            category: Category::Enrolment,
            columns: vec![],
            rows: vec![
                UnifiedRecord {
                    record: record.clone(),
                    temporal: Some(features(NaiveDate::from_ymd_opt(2025, 1, 9).unwrap())),
                },
                UnifiedRecord {
                    record: record.clone(),
                    temporal: None,
                },
                UnifiedRecord {
                    record,
                    temporal: Some(features(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())),
                },
            ],
            unparsed_dates: 1,
        };
        let (lo, hi) = table.date_range().unwrap();
        assert_eq!(lo, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(hi, NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
        assert_eq!(table.dated_rows().count(), 2);
    }

    #[test]
    fn test_record_total() {
        let record = Record {
            date: "01-01-2025".to_string(),
            state: "S".to_string(),
            district: "D".to_string(),
            pincode: "1".to_string(),
            counters: vec![4, 5, 6],
        };
        assert_eq!(record.total(), 15);
    }
}
