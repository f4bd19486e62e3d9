//! Recording state management
//!
//! Defines the session state machine, the segments a session is made of and
//! the running duration clock.

use super::options::RecordingOptions;
use crate::utils::fs::file_size;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No session
    Idle,
    /// Waiting out the countdown before segment 0
    CountingDown,
    /// An encoder process is capturing
    Recording,
    /// Between segments
    Paused,
    /// Capture ended, segments wait for finalize
    Stopped,
    /// Segments are being joined
    Finalizing,
    /// Final file written
    Completed,
    /// Encoder crash, empty recording or failed finalize
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// Whether this state blocks a new session from starting
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SessionState::Idle | SessionState::Completed | SessionState::Failed
        )
    }
}

/// What became of a segment's file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentStatus {
    /// Encoder still writing
    Recording,
    /// Closed with data on disk
    Closed,
    /// Closed with a zero-byte file, which was deleted
    Empty,
    /// Encoder died on its own
    Crashed,
}

/// One continuous captured interval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Segment index (0, 1, 2, ...)
    pub index: usize,

    pub path: PathBuf,

    pub started_at: DateTime<Utc>,

    /// Captured time in milliseconds, set when the segment closes
    pub duration_ms: u64,

    pub status: SegmentStatus,

    /// File size at close
    pub size: Option<u64>,
}

impl Segment {
    pub fn new(index: usize, path: PathBuf) -> Self {
        Self {
            index,
            path,
            started_at: Utc::now(),
            duration_ms: 0,
            status: SegmentStatus::Recording,
            size: None,
        }
    }

    /// Close the segment and inspect its file. A zero-byte file is deleted.
    pub fn close(&mut self, duration_ms: u64, crashed: bool) -> SegmentStatus {
        self.duration_ms = duration_ms;
        self.size = file_size(&self.path);

        self.status = match self.size {
            Some(0) => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!("Failed to delete empty segment {:?}: {}", self.path, e);
                }
                tracing::warn!("Segment {} produced an empty file; deleted", self.index);
                SegmentStatus::Empty
            }
            None => {
                tracing::warn!("Segment {} left no file at {:?}", self.index, self.path);
                SegmentStatus::Empty
            }
            Some(_) if crashed => SegmentStatus::Crashed,
            Some(_) => SegmentStatus::Closed,
        };

        self.status
    }

    /// Whether the segment holds usable captured data
    pub fn has_data(&self) -> bool {
        matches!(self.status, SegmentStatus::Closed | SegmentStatus::Crashed)
            && self.size.unwrap_or(0) > 0
    }
}

/// Running duration across segments
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    cumulative_ms: u64,
    running_since: Option<Instant>,
}

impl SessionClock {
    pub fn start(&mut self) {
        self.running_since = Some(Instant::now());
    }

    /// Stop the running interval, returning its length
    pub fn stop(&mut self) -> u64 {
        let elapsed = self
            .running_since
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.cumulative_ms += elapsed;
        elapsed
    }

    /// Total time captured so far, including the running interval
    pub fn elapsed_ms(&self) -> u64 {
        self.cumulative_ms
            + self
                .running_since
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}

/// A recording session, start to final output
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub options: RecordingOptions,
    pub output_dir: PathBuf,
    pub final_path: PathBuf,
    /// Append-only
    pub segments: Vec<Segment>,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(options: RecordingOptions, output_dir: PathBuf, final_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            options,
            output_dir,
            final_path,
            segments: Vec::new(),
            started_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn next_index(&self) -> usize {
        self.segments.last().map(|s| s.index + 1).unwrap_or(0)
    }

    /// `<final stem>-segment-<index>.<ext>` next to the final file
    pub fn segment_path(&self, index: usize) -> PathBuf {
        segment_path_for(&self.final_path, index)
    }

    pub fn active_segment_mut(&mut self) -> Option<&mut Segment> {
        self.segments
            .last_mut()
            .filter(|s| s.status == SegmentStatus::Recording)
    }

    pub fn usable_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.has_data())
    }

    pub fn snapshot(&self, duration_ms: u64) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            output_path: self.final_path.display().to_string(),
            segments: self.segments.clone(),
            duration_ms,
            started_at: self.started_at,
            last_error: self.last_error.clone(),
            options: self.options.clone(),
        }
    }
}

pub fn segment_path_for(final_path: &Path, index: usize) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    let name = match final_path.extension() {
        Some(ext) => format!("{stem}-segment-{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}-segment-{index}"),
    };
    final_path.with_file_name(name)
}

/// Serialisable view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub output_path: String,
    pub segments: Vec<Segment>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub options: RecordingOptions,
}
