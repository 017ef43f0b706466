use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::alerts::AlertConfig;
use crate::anomaly::{AnomalyConfig, AnomalyOverrides};
use crate::dynamics::DynamicsConfig;
use crate::error::{AnalyticsError, Result};
use crate::forecast::ForecastConfig;
use crate::lead_lag::LeadLagConfig;
use crate::pareto::ParetoConfig;
use crate::resilience::ResilienceConfig;
use crate::temporal::DateOrder;

/// Report sections selectable with `--section`.
pub const REPORT_SECTIONS: [&str; 12] = [
    "all",
    "summary",
    "volume",
    "rollups",
    "regional",
    "anomalies",
    "resilience",
    "pareto",
    "lead_lag",
    "forecast",
    "alerts",
    "dynamics",
];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Operational analytics over Aadhaar enrolment and update extracts
#[derive(Parser, Debug, Clone)]
#[command(
    name = "aadhaar-ops",
    about = "Operational analytics over Aadhaar enrolment and update extracts",
    version
)]
pub struct Settings {
    /// Directory searched recursively for CSV extracts
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Analysis configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Report section to emit
    #[arg(long, default_value = "all", value_parser = REPORT_SECTIONS)]
    pub section: String,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    pub init_config: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse CLI arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The config file this run reads (or writes with `--init-config`).
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(AnalysisConfig::default_path)
    }
}

// ── AnalysisConfig ─────────────────────────────────────────────────────────────

/// Every tunable of the analysis. Missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub date_order: DateOrder,
    #[serde(deserialize_with = "daily_anomaly")]
    pub daily_anomaly: AnomalyConfig,
    #[serde(deserialize_with = "monthly_anomaly")]
    pub monthly_anomaly: AnomalyConfig,
    pub resilience: ResilienceConfig,
    pub pareto: ParetoConfig,
    pub lead_lag: LeadLagConfig,
    pub forecast: ForecastConfig,
    pub alerts: AlertConfig,
    pub dynamics: DynamicsConfig,
    /// Busiest days reported.
    pub daily_peaks: usize,
    /// Busiest months reported.
    pub monthly_peaks: usize,
    /// Weight of updates in the Operational Load Index.
    pub load_index_update_weight: f64,
    /// Divisor of the Operational Load Index.
    pub load_index_scale: f64,
}

// Partial anomaly objects overlay their own granularity's defaults.
fn daily_anomaly<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<AnomalyConfig, D::Error> {
    AnomalyOverrides::deserialize(d).map(|o| AnomalyConfig::daily().overlay(o))
}

fn monthly_anomaly<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<AnomalyConfig, D::Error> {
    AnomalyOverrides::deserialize(d).map(|o| AnomalyConfig::monthly().overlay(o))
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            date_order: DateOrder::default(),
            daily_anomaly: AnomalyConfig::daily(),
            monthly_anomaly: AnomalyConfig::monthly(),
            resilience: ResilienceConfig::default(),
            pareto: ParetoConfig::default(),
            lead_lag: LeadLagConfig::default(),
            forecast: ForecastConfig::default(),
            alerts: AlertConfig::default(),
            dynamics: DynamicsConfig::default(),
            daily_peaks: 5,
            monthly_peaks: 3,
            load_index_update_weight: 1.5,
            load_index_scale: 1000.0,
        }
    }
}

impl AnalysisConfig {
    /// `~/.aadhaar-ops/config.json`.
    pub fn default_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".aadhaar-ops").join("config.json")
    }

    /// Load a config file. Unlike the default path, an explicit file must
    /// exist and parse.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AnalyticsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for a run: the `--config` file if given, else the default path
    /// if it exists, else built-in defaults.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        if let Some(path) = &settings.config {
            debug!("Loading analysis config from {}", path.display());
            return Self::load_from(path);
        }
        let default = Self::default_path();
        if default.exists() {
            debug!("Loading analysis config from {}", default.display());
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    /// Atomically write the config, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reject values the analysis cannot run with.
    pub fn validate(&self) -> Result<()> {
        let f = &self.forecast;
        if f.holdout == 0 {
            return Err(AnalyticsError::Config("forecast.holdout must be positive".into()));
        }
        if !(0.0..=1.0).contains(&f.alpha) || !(0.0..=1.0).contains(&f.beta) {
            return Err(AnalyticsError::Config(
                "forecast.alpha and forecast.beta must be within [0, 1]".into(),
            ));
        }
        if self.resilience.recovery_multiplier < 1.0 {
            return Err(AnalyticsError::Config(
                "resilience.recovery_multiplier must be at least 1".into(),
            ));
        }
        if self.dynamics.sustained_days == 0 {
            return Err(AnalyticsError::Config(
                "dynamics.sustained_days must be positive".into(),
            ));
        }
        if self.load_index_scale <= 0.0 {
            return Err(AnalyticsError::Config("load_index_scale must be positive".into()));
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::load_from_args(["aadhaar-ops"]);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert!(settings.config.is_none());
        assert!(settings.output.is_none());
        assert_eq!(settings.section, "all");
        assert!(!settings.pretty);
        assert!(!settings.init_config);
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
    }

    #[test]
    fn test_debug_flag_overrides_log_level() {
        let settings = Settings::load_from_args(["aadhaar-ops", "--log-level", "ERROR", "--debug"]);
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_invalid_section_rejected() {
        let result = Settings::try_parse_from(["aadhaar-ops", "--section", "charts"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_path_prefers_explicit() {
        let settings = Settings::load_from_args(["aadhaar-ops", "--config", "/tmp/a.json"]);
        assert_eq!(settings.config_path(), PathBuf::from("/tmp/a.json"));
    }

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = AnalysisConfig::default();
        assert_eq!(config.daily_anomaly.z_threshold, 2.5);
        assert_eq!(config.monthly_anomaly.z_threshold, 2.0);
        assert_eq!(config.resilience.recovery_multiplier, 1.2);
        assert_eq!(config.lead_lag.significance, 0.05);
        assert_eq!(config.lead_lag.max_lag, 7);
        assert_eq!(config.forecast.alpha, 0.3);
        assert_eq!(config.forecast.beta, 0.1);
        assert_eq!(config.forecast.holdout, 7);
        assert_eq!(config.forecast.horizon, 14);
        assert_eq!(config.alerts.operations_red_pct, 95.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let tmp = TempDir::new().expect("tempdir");
        let path = AnalysisConfig::config_path_in(tmp.path());
        let mut config = AnalysisConfig::default();
        config.forecast.horizon = 30;
        config.date_order = DateOrder::MonthFirst;

        config.save_to(&path).expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = AnalysisConfig::load_from(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("partial.json");
        std::fs::write(&path, r#"{"forecast": {"holdout": 3}, "daily_peaks": 10}"#).unwrap();

        let loaded = AnalysisConfig::load_from(&path).expect("load");
        assert_eq!(loaded.forecast.holdout, 3);
        assert_eq!(loaded.forecast.horizon, 14);
        assert_eq!(loaded.daily_peaks, 10);
        assert_eq!(loaded.monthly_peaks, 3);
    }

    #[test]
    fn test_partial_anomaly_config_keeps_granularity_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"monthly_anomaly": {"iqr_multiplier": 3.0}}"#).unwrap();
        assert_eq!(config.monthly_anomaly.z_threshold, 2.0);
        assert_eq!(config.monthly_anomaly.iqr_multiplier, 3.0);
        assert_eq!(config.daily_anomaly, AnomalyConfig::daily());

        let config: AnalysisConfig =
            serde_json::from_str(r#"{"daily_anomaly": {"z_threshold": 3.0}}"#).unwrap();
        assert_eq!(config.daily_anomaly.z_threshold, 3.0);
        assert_eq!(config.daily_anomaly.iqr_multiplier, 1.5);
        assert_eq!(config.monthly_anomaly, AnomalyConfig::monthly());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = AnalysisConfig::load_from(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, AnalyticsError::FileRead { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"forecast": {"holdout": 0}}"#).unwrap();
        let err = AnalysisConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, AnalyticsError::Config(_)));

        std::fs::write(&path, "{not json").unwrap();
        let err = AnalysisConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, AnalyticsError::JsonParse(_)));
    }

    #[test]
    fn test_resolve_uses_explicit_config() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cfg.json");
        std::fs::write(&path, r#"{"monthly_peaks": 6}"#).unwrap();
        let settings = Settings::load_from_args([
            "aadhaar-ops".to_string(),
            "--config".to_string(),
            path.display().to_string(),
        ]);
        let config = AnalysisConfig::resolve(&settings).expect("resolve");
        assert_eq!(config.monthly_peaks, 6);
    }
}
