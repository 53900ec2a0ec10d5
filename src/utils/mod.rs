pub mod csv;

use anyhow::{Context, Result};
use std::path::Path;

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Current time as an RFC 3339 UTC timestamp, the format every `*_at` column uses
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Empty strings clear an optional column
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
