mod bootstrap;
mod output;

use aadhaar_core::settings::{AnalysisConfig, Settings};
use aadhaar_data::analysis::analyze_path;
use anyhow::{Context, Result};

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("aadhaar-ops v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.init_config {
        let path = settings.config_path();
        AnalysisConfig::default()
            .save_to(&path)
            .with_context(|| format!("writing default config to {}", path.display()))?;
        tracing::info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = AnalysisConfig::resolve(&settings)?;
    tracing::info!(
        "Analysing {} (section: {})",
        settings.data_dir.display(),
        settings.section
    );

    let report = analyze_path(&settings.data_dir, &config)
        .with_context(|| format!("analysing {}", settings.data_dir.display()))?;
    for omitted in &report.omitted {
        tracing::warn!("{} omitted: {}", omitted.section, omitted.reason);
    }

    let section = report.section(&settings.section)?;
    let json = output::render(&section, settings.pretty)?;
    output::write_report(&json, settings.output.as_deref())?;

    Ok(())
}
