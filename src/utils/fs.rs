//! Filesystem helpers
//!
//! Directory checks, output naming and file inspection used around the
//! encoder process.

use super::error::{RecorderError, RecorderResult};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Make sure `dir` exists and accepts new files. Writability is checked by
/// creating (and dropping) a temp file inside it.
pub fn ensure_writable_dir(dir: &Path) -> RecorderResult<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| RecorderError::directory(dir, e))?;
        tracing::info!("Created output directory {:?}", dir);
    }

    if !dir.is_dir() {
        return Err(RecorderError::directory(dir, "not a directory"));
    }

    tempfile::Builder::new()
        .prefix(".write-check")
        .tempfile_in(dir)
        .map_err(|e| RecorderError::directory(dir, e))?;

    Ok(())
}

/// Pick a session output path that does not exist yet.
///
/// Names look like `presentation-2024-05-01T10-00-00-000Z.mp4`; on collision a
/// counter is appended. `taken` lets the caller reserve extra sibling paths
/// (segment files) that must not collide either.
pub fn unique_output_path<F>(
    dir: &Path,
    prefix: &str,
    extension: &str,
    now: DateTime<Utc>,
    taken: F,
) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let stamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
    let mut candidate = dir.join(format!("{prefix}-{stamp}.{extension}"));
    let mut counter = 1;

    while candidate.exists() || taken(&candidate) {
        candidate = dir.join(format!("{prefix}-{stamp}-{counter}.{extension}"));
        counter += 1;
    }

    candidate
}

/// Size in bytes, or `None` when the file is missing
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Human readable size, e.g. `1.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut exponent = 0;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }

    // Trim trailing zeros the way a human would write it
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}

/// Facts about a recorded file on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub path: String,
    pub size: u64,
    pub size_formatted: String,
    pub modified: Option<DateTime<Local>>,
}

/// Stat a recorded file
pub fn recording_info(path: &Path) -> RecorderResult<RecordingInfo> {
    let metadata = std::fs::metadata(path)?;
    Ok(RecordingInfo {
        path: path.display().to_string(),
        size: metadata.len(),
        size_formatted: format_file_size(metadata.len()),
        modified: metadata.modified().ok().map(DateTime::<Local>::from),
    })
}
