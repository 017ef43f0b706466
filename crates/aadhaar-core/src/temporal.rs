use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    RecordTable, TemporalFeatures, UnifiedRecord, UnifiedTable, DERIVED_TEMPORAL_COLUMNS,
};

// ── DateOrder ─────────────────────────────────────────────────────────────────

/// How to read ambiguous `NN-NN-YYYY` dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// `DD-MM-YYYY`, the layout of the published extracts.
    #[default]
    DayFirst,
    /// `MM-DD-YYYY`.
    MonthFirst,
}

const DAY_FIRST_FMTS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"];
const MONTH_FIRST_FMTS: &[&str] = &["%m-%d-%Y", "%m/%d/%Y"];
const ISO_FMTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FMTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

// ── TemporalDeriver ───────────────────────────────────────────────────────────

/// Parses raw record dates and derives the calendar attributes used for
/// time-keyed rollups.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalDeriver {
    order: DateOrder,
}

impl TemporalDeriver {
    pub fn new(order: DateOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> DateOrder {
        self.order
    }

    /// Parse a raw date string into a calendar date.
    ///
    /// Accepts day- or month-first dashed/slashed dates (per [`DateOrder`]),
    /// ISO dates, RFC 3339 timestamps and naive `YYYY-MM-DD HH:MM:SS`
    /// datetimes. Years must have four digits. Returns `None` for empty or
    /// unrecognised input.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        let ordered = match self.order {
            DateOrder::DayFirst => DAY_FIRST_FMTS,
            DateOrder::MonthFirst => MONTH_FIRST_FMTS,
        };
        // chrono's %Y also takes "25", which would land in year 0025
        let four_digit = |date: NaiveDate| (1000..=9999).contains(&date.year()).then_some(date);
        ordered
            .iter()
            .chain(ISO_FMTS.iter())
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok().and_then(four_digit))
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .and_then(|dt| four_digit(dt.date_naive()))
            })
            .or_else(|| {
                DATETIME_FMTS.iter().find_map(|fmt| {
                    NaiveDateTime::parse_from_str(s, fmt)
                        .ok()
                        .and_then(|dt| four_digit(dt.date()))
                })
            })
    }

    /// Derive year, month, quarter and month bucket for a parsed date.
    pub fn features(date: NaiveDate) -> TemporalFeatures {
        let month = date.month();
        TemporalFeatures {
            date,
            year: date.year(),
            month,
            quarter: (month - 1) / 3 + 1,
            month_bucket: format!("{:04}-{:02}", date.year(), month),
        }
    }

    /// Parse and derive temporal attributes for a single raw date.
    pub fn derive(&self, raw: &str) -> Option<TemporalFeatures> {
        self.parse_date(raw).map(Self::features)
    }

    /// Attach temporal features to every record of `table`.
    ///
    /// Row order and count are preserved. Rows whose date cannot be parsed
    /// keep `temporal: None` and are counted in
    /// [`UnifiedTable::unparsed_dates`].
    pub fn derive_table(&self, table: RecordTable) -> UnifiedTable {
        let RecordTable {
            category,
            mut columns,
            records,
        } = table;

        let mut unparsed_dates = 0usize;
        let rows: Vec<UnifiedRecord> = records
            .into_iter()
            .map(|record| {
                let temporal = self.derive(&record.date);
                if temporal.is_none() {
                    unparsed_dates += 1;
                }
                UnifiedRecord { record, temporal }
            })
            .collect();

        if unparsed_dates > 0 {
            warn!(
                "{}: {} of {} records have unparseable dates",
                category,
                unparsed_dates,
                rows.len()
            );
        }
        debug!("{}: temporal features derived for {} rows", category, rows.len());

        for derived in DERIVED_TEMPORAL_COLUMNS {
            if !columns.iter().any(|c| c == derived) {
                columns.push(derived.to_string());
            }
        }

        UnifiedTable {
            category,
            columns,
            rows,
            unparsed_dates,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
