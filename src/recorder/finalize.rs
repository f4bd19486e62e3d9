//! Session finalization
//!
//! Joins a session's segments into the final output file: a single segment
//! is moved into place, several are stream-copied through ffmpeg's concat
//! demuxer. Concatenated segments stay on disk; only the temporary list is
//! removed.

use super::state::Segment;
use crate::ffmpeg::command::concat_args;
use crate::utils::fs::file_size;
use crate::utils::{RecorderError, RecorderResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// What finalize produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    pub path: PathBuf,
    pub size: u64,
    /// Segments joined into the output
    pub segments_used: usize,
    /// Segments left out because they were empty at close
    pub segments_skipped: usize,
}

/// Joins segments into the final file
#[derive(Debug, Clone)]
pub struct Finalizer {
    ffmpeg_path: PathBuf,
}

impl Finalizer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub async fn finalize(&self, segments: &[Segment], output: &Path) -> RecorderResult<FinalizeReport> {
        let (usable, skipped): (Vec<&Segment>, Vec<&Segment>) =
            segments.iter().partition(|s| s.has_data());

        for segment in &skipped {
            tracing::warn!(
                "Skipping segment {} ({:?}): empty at close",
                segment.index,
                segment.status
            );
        }

        if usable.is_empty() {
            return Err(RecorderError::Finalize("No recorded segments to finalize".to_string()));
        }

        // Every listed segment must still be on disk with data
        let broken: Vec<String> = usable
            .iter()
            .filter(|s| file_size(&s.path).unwrap_or(0) == 0)
            .map(|s| s.path.display().to_string())
            .collect();
        if !broken.is_empty() {
            return Err(RecorderError::Finalize(format!(
                "Segment files missing or empty: {}",
                broken.join(", ")
            )));
        }

        if let [single] = usable.as_slice() {
            move_file(&single.path, output).await?;
        } else {
            self.concat(&usable, output).await?;
        }

        let size = file_size(output).unwrap_or(0);
        if size == 0 {
            return Err(RecorderError::Finalize(format!(
                "Final output {} is missing or empty",
                output.display()
            )));
        }

        tracing::info!(
            "Finalized {} segment(s) into {:?} ({} bytes)",
            usable.len(),
            output,
            size
        );

        Ok(FinalizeReport {
            path: output.to_path_buf(),
            size,
            segments_used: usable.len(),
            segments_skipped: skipped.len(),
        })
    }

    async fn concat(&self, segments: &[&Segment], output: &Path) -> RecorderResult<()> {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut list = tempfile::Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        list.write_all(concat_list(segments).as_bytes())?;
        list.flush()?;

        let args = concat_args(list.path(), output);
        tracing::info!("Concatenating {} segments: {:?}", segments.len(), args);

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await;

        // List is removed whatever the encoder did
        if let Err(e) = list.close() {
            tracing::warn!("Failed to remove concat list: {}", e);
        }

        let output_status = result.map_err(|e| {
            RecorderError::Finalize(format!("Failed to run {:?}: {}", self.ffmpeg_path, e))
        })?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(RecorderError::Finalize(format!(
                "Concatenation exited with {}: {}",
                output_status.status, last
            )));
        }

        Ok(())
    }
}

/// Concat demuxer list, one `file '<path>'` line per segment in order
pub fn concat_list(segments: &[&Segment]) -> String {
    segments
        .iter()
        .map(|s| {
            let path = std::fs::canonicalize(&s.path).unwrap_or_else(|_| s.path.clone());
            format!("file '{}'\n", path.to_string_lossy().replace('\'', "'\\''"))
        })
        .collect()
}

/// Rename, or copy and delete when the rename crosses filesystems
async fn move_file(from: &Path, to: &Path) -> RecorderResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(from, to)
        .await
        .map_err(|e| RecorderError::Finalize(format!("Failed to copy {}: {}", from.display(), e)))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        tracing::warn!("Copied segment but could not remove {:?}: {}", from, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::SegmentStatus;

    fn closed_segment(dir: &Path, index: usize, data: &[u8]) -> Segment {
        let path = dir.join(format!("out-segment-{index}.mp4"));
        std::fs::write(&path, data).unwrap();
        let mut segment = Segment::new(index, path);
        segment.close(1000, false);
        segment
    }

    #[tokio::test]
    async fn test_single_segment_is_moved() {
        let dir = tempfile::tempdir().unwrap();
        let segment = closed_segment(dir.path(), 0, b"video");
        let output = dir.path().join("out.mp4");

        let report = Finalizer::new("/nonexistent/ffmpeg")
            .finalize(&[segment.clone()], &output)
            .await
            .unwrap();
        assert_eq!(report.segments_used, 1);
        assert_eq!(std::fs::read(&output).unwrap(), b"video");
        assert!(!segment.path.exists());
    }

    #[tokio::test]
    async fn test_no_segments_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let err = Finalizer::new("ffmpeg").finalize(&[], &output).await.unwrap_err();
        assert_eq!(err.code(), "FINALIZE_ERROR");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_segment_file_fails_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let first = closed_segment(dir.path(), 0, b"a");
        let second = closed_segment(dir.path(), 1, b"b");
        std::fs::remove_file(&second.path).unwrap();

        let output = dir.path().join("out.mp4");
        let err = Finalizer::new("ffmpeg")
            .finalize(&[first.clone(), second], &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out-segment-1.mp4"));
        assert!(first.path.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_segments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let empty = closed_segment(dir.path(), 0, b"");
        assert_eq!(empty.status, SegmentStatus::Empty);
        let real = closed_segment(dir.path(), 1, b"data");

        let output = dir.path().join("out.mp4");
        let report = Finalizer::new("ffmpeg")
            .finalize(&[empty, real], &output)
            .await
            .unwrap();
        assert_eq!(report.segments_used, 1);
        assert_eq!(report.segments_skipped, 1);
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let segment = Segment::new(0, PathBuf::from("/nowhere/it's.mp4"));
        assert_eq!(concat_list(&[&segment]), "file '/nowhere/it'\\''s.mp4'\n");
    }
}
