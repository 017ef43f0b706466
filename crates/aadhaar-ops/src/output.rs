use std::path::Path;

use anyhow::Context;

/// Render a report section as JSON.
pub fn render(section: &serde_json::Value, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(section)?
    } else {
        serde_json::to_string(section)?
    };
    Ok(json)
}

/// Write `json` to `output`, or to stdout when no path is given. Files are
/// replaced atomically.
pub fn write_report(json: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = output else {
        println!("{}", json);
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, format!("{}\n", json))
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}
