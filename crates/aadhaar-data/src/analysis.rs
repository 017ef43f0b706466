//! Main analysis pipeline.
//!
//! Loads the extracts, builds the unified dataset and rollups, then runs
//! every statistical stage over them, returning an [`AnalysisReport`]. A stage
//! that lacks enough observations is listed in [`AnalysisReport::omitted`]
//! instead of failing the run.

use std::path::Path;
use std::time::Instant;

use aadhaar_core::alerts::{AlertReport, EarlyWarning};
use aadhaar_core::anomaly::{
    top_periods, AnomalyDetector, AnomalyReport, PeakPeriod, StressEvent, VolatilityMetrics,
};
use aadhaar_core::dynamics::{DynamicsAnalyzer, UpdateDynamics};
use aadhaar_core::error::{AnalyticsError, Result};
use aadhaar_core::forecast::{ForecastReport, Forecaster};
use aadhaar_core::lead_lag::{
    ContemporaneousCorrelation, LagCorrelation, LeadLagAnalyzer, LeadLagResult,
};
use aadhaar_core::models::CategoryTotals;
use aadhaar_core::pareto::{ParetoAnalysis, ParetoAnalyzer};
use aadhaar_core::resilience::{attach_recovery, ResilienceScore, ResilienceScorer};
use aadhaar_core::settings::AnalysisConfig;
use aadhaar_core::temporal::TemporalDeriver;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{RegionalMeasure, RollupEngine, Rollups, VolumeMeasures};
use crate::reader::discover_tables;
use crate::schema::{DatasetSummary, SchemaBuilder, UnifiedDataset};

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this report was generated.
    pub generated_at: String,
    /// Directory the extracts were read from, when loaded from disk.
    pub data_path: Option<String>,
    pub files_loaded: usize,
    pub records_processed: usize,
    /// Wall-clock seconds spent reading and unifying the extracts.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent on rollups and statistics.
    pub analysis_time_seconds: f64,
}

/// A statistic left out because its input was too short or degenerate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmittedStatistic {
    pub section: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionalReport {
    pub states: Vec<RegionalMeasure>,
    pub districts: Vec<RegionalMeasure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalySection {
    pub daily: Option<AnomalyReport>,
    pub monthly: Option<AnomalyReport>,
    pub volatility: VolatilityMetrics,
    pub daily_peaks: Vec<PeakPeriod>,
    pub monthly_peaks: Vec<PeakPeriod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResilienceSection {
    /// Daily stress events with recovery times attached.
    pub stress_events: Vec<StressEvent>,
    pub score: Option<ResilienceScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParetoSection {
    /// Days by total operations.
    pub dates: Option<ParetoAnalysis>,
    /// Months by total operations.
    pub months: Option<ParetoAnalysis>,
    /// States by total updates.
    pub states: Option<ParetoAnalysis>,
    /// Districts by total updates.
    pub districts: Option<ParetoAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadLagSection {
    /// All updates against total daily operations.
    pub updates: Option<LeadLagResult>,
    pub demographic: Option<LeadLagResult>,
    pub biometric: Option<LeadLagResult>,
    /// Same-month correlation of updates and operations.
    pub monthly: Option<ContemporaneousCorrelation>,
    /// Past updates against current operations.
    pub predictive: Option<Vec<LagCorrelation>>,
}

/// The complete output of [`analyze_dataset`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: AnalysisMetadata,
    pub summary: DatasetSummary,
    pub volume: VolumeMeasures,
    pub rollups: Rollups,
    pub regional: RegionalReport,
    pub anomalies: AnomalySection,
    pub resilience: ResilienceSection,
    pub pareto: ParetoSection,
    pub lead_lag: LeadLagSection,
    pub forecast: Option<ForecastReport>,
    pub alerts: Option<AlertReport>,
    pub dynamics: UpdateDynamics,
    pub omitted: Vec<OmittedStatistic>,
}

impl AnalysisReport {
    pub fn stress_events(&self) -> &[StressEvent] {
        &self.resilience.stress_events
    }

    pub fn resilience_score(&self) -> Option<&ResilienceScore> {
        self.resilience.score.as_ref()
    }

    /// One top-level section as JSON, or the whole report for `"all"`.
    pub fn section(&self, name: &str) -> Result<serde_json::Value> {
        let full = serde_json::to_value(self)?;
        if name == "all" {
            return Ok(full);
        }
        full.get(name)
            .cloned()
            .ok_or_else(|| AnalyticsError::Config(format!("unknown report section: {}", name)))
    }
}

// ── Omissions ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Omissions(Vec<OmittedStatistic>);

impl Omissions {
    /// Turn insufficient-data failures into an omission; other errors still
    /// abort the run.
    fn keep<T>(&mut self, section: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err @ AnalyticsError::InsufficientData { .. }) => {
                warn!("Omitting {}: {}", section, err);
                self.0.push(OmittedStatistic {
                    section: section.to_string(),
                    reason: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run every stage over an already unified dataset.
pub fn analyze_dataset(dataset: &UnifiedDataset, config: &AnalysisConfig) -> Result<AnalysisReport> {
    let started = Instant::now();
    let mut omitted = Omissions::default();

    // ── Rollups ──────────────────────────────────────────────────────────────
    let summary = dataset.summary();
    let volume = RollupEngine::volume_measures(
        dataset,
        config.load_index_update_weight,
        config.load_index_scale,
    );
    let rollups = RollupEngine::all(dataset);
    let regional = RegionalReport {
        states: RollupEngine::regional_measures(&rollups.states),
        districts: RollupEngine::regional_measures(&rollups.districts),
    };
    let daily_ops = rollups.daily.operations();
    let daily_updates = rollups.daily.updates();

    // ── Anomalies & resilience ───────────────────────────────────────────────
    let daily_anomalies = omitted.keep(
        "anomalies.daily",
        AnomalyDetector::new(config.daily_anomaly).detect_series(&rollups.daily),
    )?;
    let monthly_anomalies = omitted.keep(
        "anomalies.monthly",
        AnomalyDetector::new(config.monthly_anomaly).detect_series(&rollups.monthly),
    )?;

    let stress_events = daily_anomalies
        .as_ref()
        .map(|r| attach_recovery(&r.events, &daily_ops, config.resilience.recovery_multiplier))
        .unwrap_or_default();
    let score = omitted.keep(
        "resilience",
        ResilienceScorer::new(config.resilience).score(&daily_ops, &stress_events),
    )?;

    let anomalies = AnomalySection {
        daily: daily_anomalies,
        monthly: monthly_anomalies,
        volatility: VolatilityMetrics::compute(&rollups.daily, &rollups.monthly),
        daily_peaks: top_periods(&rollups.daily, config.daily_peaks),
        monthly_peaks: top_periods(&rollups.monthly, config.monthly_peaks),
    };

    // ── Pareto ───────────────────────────────────────────────────────────────
    let pareto = ParetoAnalyzer::new(config.pareto);
    let pareto = ParetoSection {
        dates: omitted.keep(
            "pareto.dates",
            pareto.analyze_series(&rollups.daily, CategoryTotals::total_operations),
        )?,
        months: omitted.keep(
            "pareto.months",
            pareto.analyze_series(&rollups.monthly, CategoryTotals::total_operations),
        )?,
        states: omitted.keep(
            "pareto.states",
            pareto.analyze_series(&rollups.states, CategoryTotals::total_updates),
        )?,
        districts: omitted.keep(
            "pareto.districts",
            pareto.analyze_series(&rollups.districts, CategoryTotals::total_updates),
        )?,
    };

    // ── Lead-lag ─────────────────────────────────────────────────────────────
    let lead_lag = LeadLagAnalyzer::new(config.lead_lag.clone());
    let lead_lag = LeadLagSection {
        updates: omitted.keep(
            "lead_lag.updates",
            lead_lag.cross_correlate(&daily_updates, &daily_ops),
        )?,
        demographic: omitted.keep(
            "lead_lag.demographic",
            lead_lag.cross_correlate(&rollups.daily.values(|t| t.demographic_updates), &daily_ops),
        )?,
        biometric: omitted.keep(
            "lead_lag.biometric",
            lead_lag.cross_correlate(&rollups.daily.values(|t| t.biometric_updates), &daily_ops),
        )?,
        monthly: omitted.keep(
            "lead_lag.monthly",
            lead_lag.contemporaneous(&rollups.monthly.updates(), &rollups.monthly.operations()),
        )?,
        predictive: omitted.keep(
            "lead_lag.predictive",
            lead_lag.predictive_lags(&daily_updates, &daily_ops),
        )?,
    };

    // ── Forecast, alerts, dynamics ───────────────────────────────────────────
    let forecast = omitted.keep(
        "forecast",
        Forecaster::new(config.forecast.clone()).forecast_series(&rollups.daily),
    )?;
    let alerts = omitted.keep(
        "alerts",
        EarlyWarning::new(config.alerts).analyze(&rollups.daily),
    )?;
    let dynamics = DynamicsAnalyzer::new(config.dynamics).analyze(&rollups.daily, &rollups.monthly);

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        data_path: None,
        files_loaded: 0,
        records_processed: dataset.total_records(),
        load_time_seconds: 0.0,
        analysis_time_seconds: started.elapsed().as_secs_f64(),
    };

    info!(
        "Analysis complete: {} daily periods, {} stress events, {} statistics omitted",
        rollups.daily.len(),
        stress_events.len(),
        omitted.0.len()
    );

    Ok(AnalysisReport {
        metadata,
        summary,
        volume,
        rollups,
        regional,
        anomalies,
        resilience: ResilienceSection {
            stress_events,
            score,
        },
        pareto,
        lead_lag,
        forecast,
        alerts,
        dynamics,
        omitted: omitted.0,
    })
}

/// Run the full pipeline on the extracts under `data_path`.
///
/// 1. Discover and read every CSV extract.
/// 2. Validate and unify the three record families.
/// 3. Hand the dataset to [`analyze_dataset`].
pub fn analyze_path(data_path: &Path, config: &AnalysisConfig) -> Result<AnalysisReport> {
    let load_start = Instant::now();
    let tables = discover_tables(data_path)?;
    let files_loaded = tables.file_count();
    let dataset =
        SchemaBuilder::new(TemporalDeriver::new(config.date_order)).build_dataset(tables)?;
    let load_time = load_start.elapsed().as_secs_f64();

    let mut report = analyze_dataset(&dataset, config)?;
    report.metadata.data_path = Some(data_path.display().to_string());
    report.metadata.files_loaded = files_loaded;
    report.metadata.load_time_seconds = load_time;
    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    const SPIKE_DAY: u32 = 15;

    fn write_csv(dir: &Path, name: &str, header: &str, rows: &[String]) {
        let mut content = format!("{}\n", header);
        for row in rows {
            writeln!(content, "{}", row).unwrap();
        }
        std::fs::write(dir.join(name), content).unwrap();
    }

    /// `days` days of March 2025 with one demographic spike.
    fn write_extracts(dir: &Path, days: u32) {
        let mut enrol = Vec::new();
        let mut demo = Vec::new();
        let mut bio = Vec::new();
        for day in 1..=days {
            let i = day as u64;
            let date = format!("{:02}-03-2025", day);
            let e = 100 + 10 * (i % 5);
            let mut d = 200 + 15 * (i % 7);
            if day == SPIKE_DAY {
                d *= 10;
            }
            let b = 50 + 20 * (i % 3);
            enrol.push(format!("{date},Bihar,Patna,800001,{},{},0", e / 2, e - e / 2));
            demo.push(format!("{date},Bihar,Patna,800001,{},0", d));
            bio.push(format!("{date},Bihar,Patna,800001,0,{}", b));
        }
        // undated rows still count in geography rollups
        enrol.push("n/a,Goa,North Goa,403001,1,1,1".to_string());
        demo.push("01-03-2025,Goa,North Goa,403001,3,3".to_string());

        write_csv(
            dir,
            "api_data_aadhar_enrolment_0_500000.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater",
            &enrol,
        );
        write_csv(
            dir,
            "api_data_aadhar_demographic_0_500000.csv",
            "date,state,district,pincode,demo_age_5_17,demo_age_17_",
            &demo,
        );
        write_csv(
            dir,
            "api_data_aadhar_biometric_0_500000.csv",
            "date,state,district,pincode,bio_age_5_17,bio_age_17_",
            &bio,
        );
    }

    fn omitted_sections(report: &AnalysisReport) -> Vec<&str> {
        report.omitted.iter().map(|o| o.section.as_str()).collect()
    }

    // ── analyze_path ──────────────────────────────────────────────────────────

    #[test]
    fn test_analyze_path_full_history() {
        let tmp = TempDir::new().unwrap();
        write_extracts(tmp.path(), 30);

        let report = analyze_path(tmp.path(), &AnalysisConfig::default()).unwrap();

        assert_eq!(report.metadata.files_loaded, 3);
        assert_eq!(report.metadata.records_processed, 92);
        assert_eq!(report.summary.tables[0].unparsed_dates, 1);
        assert_eq!(report.rollups.daily.len(), 30);
        assert_eq!(report.rollups.monthly.len(), 1);
        assert_eq!(report.rollups.states.len(), 2);

        // the spike is flagged and recovers the next day
        let spike = report
            .stress_events()
            .iter()
            .find(|e| e.index == SPIKE_DAY as usize - 1)
            .expect("spike flagged");
        assert_eq!(spike.recovery, Some(1));
        assert!(report.resilience_score().is_some());

        assert!(report.pareto.dates.is_some());
        assert!(report.pareto.states.is_some());
        assert!(report.lead_lag.updates.is_some());
        assert!(report.lead_lag.predictive.is_some());
        let forecast = report.forecast.as_ref().unwrap();
        assert_eq!(forecast.holdout_len, 7);
        assert_eq!(forecast.ensemble.len(), 14);
        assert_eq!(report.alerts.as_ref().unwrap().alerts.len(), 30);

        // a single month cannot be correlated
        assert_eq!(omitted_sections(&report), vec!["lead_lag.monthly"]);
    }

    #[test]
    fn test_geography_and_volume_include_undated_rows() {
        let tmp = TempDir::new().unwrap();
        write_extracts(tmp.path(), 30);
        let report = analyze_path(tmp.path(), &AnalysisConfig::default()).unwrap();

        let grand = report.volume.totals;
        assert_eq!(report.rollups.states.totals(), grand);
        assert_eq!(report.rollups.districts.totals(), grand);
        assert_eq!(grand.enrolments - report.rollups.daily.totals().enrolments, 3);
        assert_eq!(report.regional.states.len(), 2);
    }

    #[test]
    fn test_short_history_omits_statistics() {
        let tmp = TempDir::new().unwrap();
        write_extracts(tmp.path(), 3);

        let report = analyze_path(tmp.path(), &AnalysisConfig::default()).unwrap();

        assert!(report.forecast.is_none());
        assert!(report.lead_lag.predictive.is_none());
        let omitted = omitted_sections(&report);
        assert!(omitted.contains(&"forecast"));
        assert!(omitted.contains(&"lead_lag.predictive"));
        assert!(omitted.contains(&"lead_lag.monthly"));
        // still enough for the descriptive stages
        assert!(report.anomalies.daily.is_some());
        assert!(report.alerts.is_some());
        assert_eq!(report.anomalies.daily_peaks.len(), 3);
    }

    #[test]
    fn test_missing_column_fails_run() {
        let tmp = TempDir::new().unwrap();
        write_csv(
            tmp.path(),
            "enrolment.csv",
            "date,state,district,age_0_5,age_5_17,age_18_greater",
            &["01-03-2025,Bihar,Patna,1,1,1".to_string()],
        );
        let err = analyze_path(tmp.path(), &AnalysisConfig::default()).unwrap_err();
        match err {
            AnalyticsError::MissingColumns { table, columns } => {
                assert_eq!(table, "enrolment.csv");
                assert_eq!(columns, vec!["pincode"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err =
            analyze_path(&tmp.path().join("nope"), &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, AnalyticsError::DataPathNotFound(_)));
    }

    // ── sections ──────────────────────────────────────────────────────────────

    #[test]
    fn test_section_selection() {
        let tmp = TempDir::new().unwrap();
        write_extracts(tmp.path(), 10);
        let report = analyze_path(tmp.path(), &AnalysisConfig::default()).unwrap();

        let all = report.section("all").unwrap();
        assert!(all.get("metadata").is_some());
        assert!(all.get("omitted").is_some());

        let dynamics = report.section("dynamics").unwrap();
        assert_eq!(dynamics, serde_json::to_value(&report.dynamics).unwrap());

        assert!(matches!(
            report.section("charts"),
            Err(AnalyticsError::Config(_))
        ));
    }
}
