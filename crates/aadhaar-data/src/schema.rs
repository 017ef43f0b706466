//! Unified schema construction.
//!
//! Validates each raw extract against its record family's required columns,
//! concatenates the parts of a family into one [`RecordTable`] and attaches
//! temporal features to produce the canonical [`UnifiedTable`]s.

use std::collections::{BTreeMap, BTreeSet};

use aadhaar_core::error::{AnalyticsError, Result};
use aadhaar_core::models::{Category, Record, RecordTable, UnifiedTable};
use aadhaar_core::temporal::TemporalDeriver;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::reader::{CategoryTables, RawTable};

// ── Validation ────────────────────────────────────────────────────────────────

/// Fail with every required column of `category` that `table` lacks.
pub fn validate_columns(table: &RawTable, category: Category) -> Result<()> {
    let missing: Vec<String> = category
        .required_columns()
        .into_iter()
        .filter(|col| table.column_index(col).is_none())
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalyticsError::MissingColumns {
            table: table.name(),
            columns: missing,
        })
    }
}

/// Parse a counter cell. Empty cells count as zero; integral floats such as
/// `"12.0"` are accepted.
pub fn parse_counter(raw: &str, table: &str, row: usize, column: &str) -> Result<u64> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = value.parse::<u64>() {
        return Ok(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        _ => Err(AnalyticsError::InvalidCounter {
            table: table.to_string(),
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

// ── Summaries ─────────────────────────────────────────────────────────────────

/// Shape and coverage of one unified table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub category: Category,
    pub rows: usize,
    pub columns: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub valid_dates: usize,
    pub unparsed_dates: usize,
    pub unique_states: usize,
    pub unique_districts: usize,
    pub unique_pincodes: usize,
    /// Empty cells per column across all source files.
    pub empty_cells: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub tables: Vec<TableSummary>,
    pub total_records: usize,
    /// States present in all three record families.
    pub common_states: usize,
}

// ── UnifiedDataset ────────────────────────────────────────────────────────────

/// The three canonical tables of one run.
#[derive(Debug, Clone)]
pub struct UnifiedDataset {
    pub enrolment: UnifiedTable,
    pub demographic: UnifiedTable,
    pub biometric: UnifiedTable,
    empty_cells: BTreeMap<Category, BTreeMap<String, usize>>,
}

impl UnifiedDataset {
    pub fn new(enrolment: UnifiedTable, demographic: UnifiedTable, biometric: UnifiedTable) -> Self {
        Self {
            enrolment,
            demographic,
            biometric,
            empty_cells: BTreeMap::new(),
        }
    }

    pub fn table(&self, category: Category) -> &UnifiedTable {
        match category {
            Category::Enrolment => &self.enrolment,
            Category::Demographic => &self.demographic,
            Category::Biometric => &self.biometric,
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &UnifiedTable> {
        [&self.enrolment, &self.demographic, &self.biometric].into_iter()
    }

    pub fn total_records(&self) -> usize {
        self.tables().map(UnifiedTable::len).sum()
    }

    fn states(table: &UnifiedTable) -> BTreeSet<&str> {
        table.rows.iter().map(|r| r.record.state.as_str()).collect()
    }

    /// States that appear in every record family.
    pub fn common_states(&self) -> BTreeSet<String> {
        let enrol = Self::states(&self.enrolment);
        let demo = Self::states(&self.demographic);
        let bio = Self::states(&self.biometric);
        enrol
            .into_iter()
            .filter(|s| demo.contains(s) && bio.contains(s))
            .map(str::to_string)
            .collect()
    }

    pub fn table_summary(&self, category: Category) -> TableSummary {
        let table = self.table(category);
        let mut states = BTreeSet::new();
        let mut districts = BTreeSet::new();
        let mut pincodes = BTreeSet::new();
        for row in &table.rows {
            let r = &row.record;
            states.insert(r.state.as_str());
            districts.insert((r.state.as_str(), r.district.as_str()));
            pincodes.insert(r.pincode.as_str());
        }
        TableSummary {
            category,
            rows: table.len(),
            columns: table.columns.len(),
            date_range: table.date_range(),
            valid_dates: table.len() - table.unparsed_dates,
            unparsed_dates: table.unparsed_dates,
            unique_states: states.len(),
            unique_districts: districts.len(),
            unique_pincodes: pincodes.len(),
            empty_cells: self.empty_cells.get(&category).cloned().unwrap_or_default(),
        }
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            tables: Category::ALL.iter().map(|&c| self.table_summary(c)).collect(),
            total_records: self.total_records(),
            common_states: self.common_states().len(),
        }
    }
}

// ── SchemaBuilder ─────────────────────────────────────────────────────────────

/// Builds unified tables from raw extracts.
pub struct SchemaBuilder {
    deriver: TemporalDeriver,
}

impl SchemaBuilder {
    pub fn new(deriver: TemporalDeriver) -> Self {
        Self { deriver }
    }

    /// Validate and concatenate the parts of one record family, keeping
    /// every row in file order.
    pub fn build_records(&self, category: Category, parts: &[RawTable]) -> Result<RecordTable> {
        let counters = category.counter_columns();
        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::with_capacity(parts.iter().map(RawTable::len).sum());

        for part in parts {
            validate_columns(part, category)?;
            for header in &part.headers {
                if !columns.contains(header) {
                    columns.push(header.clone());
                }
            }

            // validated above, so every lookup succeeds
            let idx = |col: &str| part.column_index(col).unwrap_or_default();
            let (date, state, district, pincode) =
                (idx("date"), idx("state"), idx("district"), idx("pincode"));
            let counter_idx: Vec<usize> = counters.iter().map(|&c| idx(c)).collect();
            let name = part.name();

            for (row_no, row) in part.rows.iter().enumerate() {
                let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
                let values = counter_idx
                    .iter()
                    .zip(counters.iter())
                    .map(|(&i, col)| parse_counter(cell(i), &name, row_no + 1, col))
                    .collect::<Result<Vec<u64>>>()?;
                records.push(Record {
                    date: cell(date).to_string(),
                    state: cell(state).to_string(),
                    district: cell(district).to_string(),
                    pincode: cell(pincode).to_string(),
                    counters: values,
                });
            }
            debug!("{}: {} rows from {}", category, part.len(), name);
        }

        Ok(RecordTable {
            category,
            columns,
            records,
        })
    }

    /// Concatenate, validate and derive temporal features for one family.
    pub fn build_table(&self, category: Category, parts: &[RawTable]) -> Result<UnifiedTable> {
        let records = self.build_records(category, parts)?;
        Ok(self.deriver.derive_table(records))
    }

    /// Build all three unified tables. A family without any file yields an
    /// empty table.
    pub fn build_dataset(&self, mut tables: CategoryTables) -> Result<UnifiedDataset> {
        let mut empty_cells = BTreeMap::new();
        let mut build = |category: Category| -> Result<UnifiedTable> {
            let parts = tables.take(category);
            empty_cells.insert(category, count_empty_cells(&parts));
            if parts.is_empty() {
                warn!("No {} extracts found; continuing with an empty table", category);
                return Ok(self.deriver.derive_table(empty_table(category)));
            }
            self.build_table(category, &parts)
        };
        let enrolment = build(Category::Enrolment)?;
        let demographic = build(Category::Demographic)?;
        let biometric = build(Category::Biometric)?;

        let mut dataset = UnifiedDataset::new(enrolment, demographic, biometric);
        dataset.empty_cells = empty_cells;

        info!(
            "Unified dataset: {} enrolment, {} demographic, {} biometric records",
            dataset.enrolment.len(),
            dataset.demographic.len(),
            dataset.biometric.len()
        );
        Ok(dataset)
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new(TemporalDeriver::default())
    }
}

fn empty_table(category: Category) -> RecordTable {
    RecordTable {
        category,
        columns: category.required_columns().into_iter().map(str::to_string).collect(),
        records: Vec::new(),
    }
}

fn count_empty_cells(parts: &[RawTable]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for part in parts {
        for row in &part.rows {
            for (header, cell) in part.headers.iter().zip(row) {
                if cell.trim().is_empty() {
                    *counts.entry(header.clone()).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

// ── Tests ──────────────────────────────────────────────────────────────────────
