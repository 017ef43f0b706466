//! CSV extract discovery and loading.
//!
//! Walks a data directory for `.csv` files, infers each file's record family
//! from its name and reads it into a [`RawTable`] for the schema builder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use aadhaar_core::error::{AnalyticsError, Result};
use aadhaar_core::models::Category;
use regex::Regex;
use tracing::{debug, info, warn};

// ── RawTable ──────────────────────────────────────────────────────────────────

/// One CSV file as read from disk: trimmed headers and string cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// File name used in error messages and summaries.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Raw tables grouped by record family, each group in path order.
#[derive(Debug, Clone, Default)]
pub struct CategoryTables {
    tables: BTreeMap<Category, Vec<RawTable>>,
}

impl CategoryTables {
    pub fn push(&mut self, category: Category, table: RawTable) {
        self.tables.entry(category).or_default().push(table);
    }

    pub fn get(&self, category: Category) -> &[RawTable] {
        self.tables.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove and return the tables of one category.
    pub fn take(&mut self, category: Category) -> Vec<RawTable> {
        self.tables.remove(&category).unwrap_or_default()
    }

    pub fn file_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.csv` files recursively under `data_path`, sorted by path.
pub fn find_csv_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

fn category_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(enrol|demographic|biometric)").expect("regex is valid"))
}

/// Infer the record family from a file name (`enrol`, `demographic` or
/// `biometric`, case-insensitive). `None` for unrelated files.
pub fn classify_file(path: &Path) -> Option<Category> {
    let name = path.file_name()?.to_string_lossy();
    let found = category_pattern().find(&name)?;
    found.as_str().parse().ok()
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Read one CSV file. Headers and cells are trimmed; every row must have as
/// many fields as the header.
pub fn read_csv_table(path: &Path) -> Result<RawTable> {
    let csv_err = |source| AnalyticsError::CsvParse {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(|source| AnalyticsError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(RawTable {
        source: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Discover, classify and read every extract under `data_path`.
///
/// Files whose name matches no record family are skipped with a warning.
pub fn discover_tables(data_path: &Path) -> Result<CategoryTables> {
    if !data_path.exists() {
        return Err(AnalyticsError::DataPathNotFound(data_path.to_path_buf()));
    }

    let files = find_csv_files(data_path);
    if files.is_empty() {
        return Err(AnalyticsError::NoDataFiles(data_path.to_path_buf()));
    }

    let mut tables = CategoryTables::default();
    for path in &files {
        let Some(category) = classify_file(path) else {
            warn!("Skipping unclassified file {}", path.display());
            continue;
        };
        let table = read_csv_table(path)?;
        debug!("{} -> {} ({} rows)", path.display(), category, table.len());
        tables.push(category, table);
    }

    if tables.is_empty() {
        return Err(AnalyticsError::NoDataFiles(data_path.to_path_buf()));
    }

    info!(
        "Loaded {} extract files from {}",
        tables.file_count(),
        data_path.display()
    );
    Ok(tables)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_find_csv_files_recursive_and_sorted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b/api_data_aadhar_biometric_0_500.csv", "a\n");
        write(tmp.path(), "a/api_data_aadhar_enrolment_0_500.CSV", "a\n");
        write(tmp.path(), "notes.txt", "ignore");

        let files = find_csv_files(tmp.path());
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
        assert!(files[0].to_string_lossy().contains("enrolment"));
    }

    #[test]
    fn test_find_csv_files_missing_dir() {
        assert!(find_csv_files(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_classify_file_names() {
        assert_eq!(
            classify_file(Path::new("api_data_aadhar_enrolment_0_500000.csv")),
            Some(Category::Enrolment)
        );
        assert_eq!(
            classify_file(Path::new("/x/API_DATA_AADHAR_DEMOGRAPHIC_1.csv")),
            Some(Category::Demographic)
        );
        assert_eq!(
            classify_file(Path::new("biometric.csv")),
            Some(Category::Biometric)
        );
        assert_eq!(classify_file(Path::new("census.csv")), None);
    }

    #[test]
    fn test_read_csv_table_trims() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "enrol.csv",
            "date , state,district,pincode\n01-03-2025, Bihar ,Patna,800001\n",
        );
        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.headers, vec!["date", "state", "district", "pincode"]);
        assert_eq!(table.rows[0][1], "Bihar");
        assert_eq!(table.column_index("pincode"), Some(3));
        assert_eq!(table.name(), "enrol.csv");
    }

    #[test]
    fn test_read_csv_table_ragged_row_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "enrol.csv", "a,b\n1,2\n3\n");
        let err = read_csv_table(&path).unwrap_err();
        assert!(matches!(err, AnalyticsError::CsvParse { .. }));
    }

    #[test]
    fn test_discover_tables_groups_by_category() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "enrolment_0.csv", "date\n01-01-2025\n");
        write(tmp.path(), "enrolment_1.csv", "date\n02-01-2025\n");
        write(tmp.path(), "demographic_0.csv", "date\n01-01-2025\n");
        write(tmp.path(), "lookup.csv", "x\n1\n");

        let tables = discover_tables(tmp.path()).unwrap();
        assert_eq!(tables.file_count(), 3);
        assert_eq!(tables.get(Category::Enrolment).len(), 2);
        assert_eq!(tables.get(Category::Demographic).len(), 1);
        assert!(tables.get(Category::Biometric).is_empty());
    }

    #[test]
    fn test_discover_tables_errors() {
        let tmp = TempDir::new().unwrap();
        let err = discover_tables(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, AnalyticsError::DataPathNotFound(_)));

        let err = discover_tables(tmp.path()).unwrap_err();
        assert!(matches!(err, AnalyticsError::NoDataFiles(_)));

        write(tmp.path(), "lookup.csv", "x\n1\n");
        let err = discover_tables(tmp.path()).unwrap_err();
        assert!(matches!(err, AnalyticsError::NoDataFiles(_)));
    }
}
