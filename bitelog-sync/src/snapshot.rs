//! Snapshot publishing
//!
//! The snapshot is the sole contract with the front end: a pretty-printed
//! JSON array of normalized records, replaced wholesale on every run. The
//! write goes through a sibling temp file and a rename so readers never
//! observe a half-written snapshot.

use std::fs;
use std::path::Path;

use bitelog_common::{Restaurant, Result};

/// Serialize the full ordered record set to `path`, atomically.
pub fn publish(records: &[Restaurant], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(records)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, path)?;

    tracing::info!(count = records.len(), path = %path.display(), "Snapshot written");
    Ok(())
}
