//! Core domain layer for Aadhaar operational analytics.
//!
//! Holds the record and rollup models, the error type, configuration, date
//! parsing and every statistical stage that runs over rollup series: stress
//! detection, resilience scoring, Pareto concentration, lead-lag correlation,
//! forecasting, early-warning alerts and update dynamics.

pub mod alerts;
pub mod anomaly;
pub mod dynamics;
pub mod error;
pub mod forecast;
pub mod lead_lag;
pub mod models;
pub mod pareto;
pub mod resilience;
pub mod settings;
pub mod stats;
pub mod temporal;

pub use error::{AnalyticsError, Result};
pub use settings::{AnalysisConfig, Settings};
