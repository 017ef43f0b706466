use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalyticsError, Result};
use crate::models::RollupSeries;
use crate::stats::{mean, population_std, sample_std};

// ── ForecastConfig ────────────────────────────────────────────────────────────

/// One trailing window of the weighted moving average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaWindow {
    pub window: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Final periods held out for validation.
    pub holdout: usize,
    /// Periods forecast past the last observation.
    pub horizon: usize,
    /// Level smoothing factor.
    pub alpha: f64,
    /// Trend smoothing factor.
    pub beta: f64,
    /// Normal quantile for the prediction band (1.96 ≈ 95%).
    pub band_z: f64,
    pub ma_windows: Vec<MaWindow>,
    /// Trailing training observations used for the moving-average band.
    pub ma_band_window: usize,
    /// Forecast range below this percent of the mean is "High" stability.
    pub high_stability_pct: f64,
    pub moderate_stability_pct: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            holdout: 7,
            horizon: 14,
            alpha: 0.3,
            beta: 0.1,
            band_z: 1.96,
            ma_windows: vec![
                MaWindow { window: 7, weight: 0.5 },
                MaWindow { window: 14, weight: 0.3 },
                MaWindow { window: 21, weight: 0.2 },
            ],
            ma_band_window: 14,
            high_stability_pct: 10.0,
            moderate_stability_pct: 30.0,
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    ExponentialSmoothing,
    MovingAverage,
}

/// A forecast value with its prediction band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Holdout error of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error, using `actual + 1` as the denominator.
    pub mape: f64,
}

impl ValidationMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                mape: 0.0,
            };
        }
        let pairs = actual.iter().zip(predicted).take(n);
        let (mut abs, mut sq, mut pct) = (0.0, 0.0, 0.0);
        for (a, p) in pairs {
            let err = a - p;
            abs += err.abs();
            sq += err * err;
            pct += (err / (a + 1.0)).abs();
        }
        let n = n as f64;
        Self {
            mae: abs / n,
            rmse: (sq / n).sqrt(),
            mape: pct / n * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub model: ForecastModel,
    /// Predictions over the held-out periods.
    pub holdout: Vec<ForecastPoint>,
    /// Predictions for the periods after the last observation.
    pub future: Vec<ForecastPoint>,
    pub validation: ValidationMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastStability {
    High,
    Moderate,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub mean_forecast: f64,
    /// Max minus min of the ensemble forecast.
    pub range: f64,
    pub mean_band_width: f64,
    pub stability: ForecastStability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub train_len: usize,
    pub holdout_len: usize,
    pub smoothing: ModelForecast,
    pub moving_average: ModelForecast,
    pub recommended: ForecastModel,
    /// Mean of both models over the future horizon.
    pub ensemble: Vec<ForecastPoint>,
    pub summary: ForecastSummary,
}

/// A raw model output: `(value, lower, upper)` per step.
type Band = (f64, f64, f64);

// ── Models ────────────────────────────────────────────────────────────────────

/// Trend-adjusted exponential smoothing over `train`, projected `steps` ahead.
///
/// Level starts at the first observation with zero trend. The band widens
/// with the horizon from the population deviation of `y − level`.
pub fn exponential_smoothing(train: &[f64], steps: usize, config: &ForecastConfig) -> Vec<Band> {
    let Some(&first) = train.first() else {
        return Vec::new();
    };
    let (alpha, beta) = (config.alpha, config.beta);

    let mut levels = Vec::with_capacity(train.len());
    levels.push(first);
    let mut level = first;
    let mut trend = 0.0;
    for &y in &train[1..] {
        let next = alpha * y + (1.0 - alpha) * (level + trend);
        trend = beta * (next - level) + (1.0 - beta) * trend;
        level = next;
        levels.push(level);
    }

    let residuals: Vec<f64> = train.iter().zip(&levels).map(|(y, l)| y - l).collect();
    let sigma = population_std(&residuals).unwrap_or(0.0);
    let n = train.len() as f64;

    (1..=steps)
        .map(|h| {
            let h = h as f64;
            let value = (level + h * trend).max(0.0);
            let margin = config.band_z * sigma * (1.0 + h / n).sqrt();
            (value, (value - margin).max(0.0), value + margin)
        })
        .collect()
}

/// Weighted blend of trailing means (each over at most `window` of the most
/// recent observations), held constant across the horizon.
pub fn weighted_moving_average(train: &[f64], steps: usize, config: &ForecastConfig) -> Vec<Band> {
    if train.is_empty() {
        return Vec::new();
    }
    let value: f64 = config
        .ma_windows
        .iter()
        .map(|w| {
            let tail = &train[train.len().saturating_sub(w.window.max(1))..];
            w.weight * mean(tail).unwrap_or(0.0)
        })
        .sum();

    let recent = &train[train.len().saturating_sub(config.ma_band_window)..];
    let margin = config.band_z * sample_std(recent).unwrap_or(0.0);
    vec![(value, (value - margin).max(0.0), value + margin); steps]
}

// ── Forecaster ────────────────────────────────────────────────────────────────

pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast a daily rollup's total operations.
    pub fn forecast_series(&self, series: &RollupSeries) -> Result<ForecastReport> {
        let dates: Vec<NaiveDate> = series.rows.iter().filter_map(|r| r.key.as_date()).collect();
        if dates.len() != series.len() {
            return Err(AnalyticsError::Config(format!(
                "forecasting needs a daily series, got {:?}",
                series.granularity
            )));
        }
        self.forecast(&dates, &series.operations())
    }

    /// Validate both models on the final `holdout` observations, then project
    /// `horizon` days past the last date.
    pub fn forecast(&self, dates: &[NaiveDate], values: &[f64]) -> Result<ForecastReport> {
        let c = &self.config;
        let n = dates.len().min(values.len());
        let required = c.holdout + 2;
        if n < required {
            return Err(AnalyticsError::insufficient("forecast", required, n));
        }
        let Some(&last_date) = dates[..n].last() else {
            return Err(AnalyticsError::insufficient("forecast", required, 0));
        };

        let train_len = n - c.holdout;
        let train = &values[..train_len];
        let actual = &values[train_len..n];
        let steps = c.holdout + c.horizon;

        let step_dates: Vec<NaiveDate> = dates[train_len..n]
            .iter()
            .copied()
            .chain((1..=c.horizon as i64).map(|d| last_date + Duration::days(d)))
            .collect();

        let build = |model: ForecastModel, bands: Vec<Band>| {
            let points: Vec<ForecastPoint> = step_dates
                .iter()
                .zip(bands)
                .map(|(&date, (value, lower, upper))| ForecastPoint {
                    date,
                    value,
                    lower,
                    upper,
                })
                .collect();
            let predicted: Vec<f64> = points[..c.holdout].iter().map(|p| p.value).collect();
            ModelForecast {
                model,
                validation: ValidationMetrics::compute(actual, &predicted),
                future: points[c.holdout..].to_vec(),
                holdout: points[..c.holdout].to_vec(),
            }
        };

        let smoothing = build(
            ForecastModel::ExponentialSmoothing,
            exponential_smoothing(train, steps, c),
        );
        let moving_average = build(
            ForecastModel::MovingAverage,
            weighted_moving_average(train, steps, c),
        );

        let recommended = if smoothing.validation.mape < moving_average.validation.mape {
            ForecastModel::ExponentialSmoothing
        } else {
            ForecastModel::MovingAverage
        };

        let ensemble: Vec<ForecastPoint> = smoothing
            .future
            .iter()
            .zip(&moving_average.future)
            .map(|(a, b)| ForecastPoint {
                date: a.date,
                value: (a.value + b.value) / 2.0,
                lower: (a.lower + b.lower) / 2.0,
                upper: (a.upper + b.upper) / 2.0,
            })
            .collect();

        let summary = self.summarize(&ensemble);
        debug!(
            "Forecast MAPE: smoothing {:.2}%, moving average {:.2}%",
            smoothing.validation.mape, moving_average.validation.mape
        );
        info!(
            "Forecast built on {} periods; recommended {:?}",
            train_len, recommended
        );

        Ok(ForecastReport {
            train_len,
            holdout_len: c.holdout,
            smoothing,
            moving_average,
            recommended,
            ensemble,
            summary,
        })
    }

    pub fn summarize(&self, points: &[ForecastPoint]) -> ForecastSummary {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let widths: Vec<f64> = points.iter().map(|p| p.upper - p.lower).collect();
        let mean_forecast = mean(&values).unwrap_or(0.0);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let range = if values.is_empty() { 0.0 } else { max - min };

        let stability = if range < mean_forecast * self.config.high_stability_pct / 100.0 {
            ForecastStability::High
        } else if range < mean_forecast * self.config.moderate_stability_pct / 100.0 {
            ForecastStability::Moderate
        } else {
            ForecastStability::Variable
        };

        ForecastSummary {
            mean_forecast,
            range,
            mean_band_width: mean(&widths).unwrap_or(0.0),
            stability,
        }
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
