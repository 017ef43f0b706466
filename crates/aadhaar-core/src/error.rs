use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the Aadhaar analytics crates.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be parsed.
    #[error("Failed to parse CSV {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// An input table lacks one or more required columns.
    #[error("Table {table} is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// A counter cell is not a non-negative number.
    #[error("Invalid counter value {value:?} in {table}, row {row}, column {column}")]
    InvalidCounter {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    /// A category name string is not one of the recognised record families.
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    /// A statistic could not be computed from the available observations.
    #[error("Insufficient data for {statistic}: need {required}, have {available}")]
    InsufficientData {
        statistic: String,
        required: usize,
        available: usize,
    },

    /// The expected data directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No CSV extracts were found under the given directory.
    #[error("No CSV files found in {0}")]
    NoDataFiles(PathBuf),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnalyticsError {
    /// Shorthand for [`AnalyticsError::InsufficientData`].
    pub fn insufficient(statistic: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            statistic: statistic.into(),
            required,
            available,
        }
    }
}

/// Convenience alias used throughout the analytics crates.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = AnalyticsError::FileRead {
            path: PathBuf::from("/data/enrolment.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/enrolment.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_missing_columns_lists_all() {
        let err = AnalyticsError::MissingColumns {
            table: "biometric_0.csv".to_string(),
            columns: vec!["pincode".to_string(), "bio_age_17_".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Table biometric_0.csv is missing required columns: pincode, bio_age_17_"
        );
    }

    #[test]
    fn test_error_display_invalid_counter() {
        let err = AnalyticsError::InvalidCounter {
            table: "enrolment.csv".to_string(),
            row: 4,
            column: "age_0_5".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid counter value \"abc\" in enrolment.csv, row 4, column age_0_5"
        );
    }

    #[test]
    fn test_error_display_insufficient_data() {
        let err = AnalyticsError::insufficient("pearson correlation", 2, 1);
        assert_eq!(
            err.to_string(),
            "Insufficient data for pearson correlation: need 2, have 1"
        );
    }

    #[test]
    fn test_error_display_invalid_category() {
        let err = AnalyticsError::InvalidCategory("census".to_string());
        assert_eq!(err.to_string(), "Invalid category: census");
    }

    #[test]
    fn test_error_display_no_data_files() {
        let err = AnalyticsError::NoDataFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No CSV files found in /empty/dir");
    }

    #[test]
    fn test_error_display_config() {
        let err = AnalyticsError::Config("holdout must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: holdout must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AnalyticsError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: AnalyticsError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
