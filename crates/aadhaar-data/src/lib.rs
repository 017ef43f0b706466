//! Data layer for Aadhaar operational analytics.
//!
//! Discovers and reads the CSV extracts, unifies the three record families,
//! rolls them up by period and region and runs the top-level analysis
//! pipeline.

pub mod aggregator;
pub mod analysis;
pub mod reader;
pub mod schema;

pub use aadhaar_core as core;
