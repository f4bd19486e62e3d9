//! Recorder configuration
//!
//! Runtime settings of the recorder itself (where ffmpeg lives, where files
//! go, how long each shutdown step may take). Per-recording choices live in
//! [`crate::recorder::options::RecordingOptions`] instead.

use crate::capture::Platform;
use crate::utils::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the ffmpeg binary
pub const FFMPEG_ENV: &str = "SESSION_RECORDER_FFMPEG";

/// Environment variable overriding the default output directory
pub const OUTPUT_DIR_ENV: &str = "SESSION_RECORDER_OUTPUT_DIR";

/// Delays and timeouts, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    pub countdown_tick_ms: u64,
    pub timer_interval_ms: u64,
    /// Wait for the encoder to exit after `q` before terminating it
    pub graceful_stop_timeout_ms: u64,
    /// Wait after the terminate signal before a hard kill
    pub terminate_timeout_ms: u64,
    /// Pause between encoder exit and checking the written file
    pub settle_delay_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            countdown_tick_ms: 1000,
            timer_interval_ms: 1000,
            graceful_stop_timeout_ms: 2000,
            terminate_timeout_ms: 2000,
            settle_delay_ms: 500,
        }
    }
}

impl Timings {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms.max(1))
    }

    pub fn graceful_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_stop_timeout_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    pub ffmpeg_path: PathBuf,
    pub platform: Platform,
    /// Used when a recording does not name an output directory
    pub default_output_dir: PathBuf,
    /// JSON file backing the settings store; in-memory when unset
    pub settings_path: Option<PathBuf>,
    pub file_prefix: String,
    /// Container extension of segment and final files
    pub container: String,
    pub watermark_text: String,
    pub timings: Timings,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            platform: Platform::current(),
            default_output_dir: default_output_dir(),
            settings_path: None,
            file_prefix: "presentation".to_string(),
            container: "mp4".to_string(),
            watermark_text: "MOVAMI".to_string(),
            timings: Timings::default(),
        }
    }
}

impl RecorderConfig {
    /// Read a JSON config file; missing fields keep their defaults
    pub fn load(path: &Path) -> RecorderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        tracing::info!("Loaded recorder config from {:?}", path);
        Ok(config.with_env_overrides())
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(path) = std::env::var_os(FFMPEG_ENV).filter(|v| !v.is_empty()) {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(dir) = std::env::var_os(OUTPUT_DIR_ENV).filter(|v| !v.is_empty()) {
            self.default_output_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.container.is_empty() || self.container.contains(&['.', '/', '\\'][..]) {
            return Err(RecorderError::Validation(format!(
                "Invalid container extension {:?}",
                self.container
            )));
        }
        if self.file_prefix.is_empty() {
            return Err(RecorderError::Validation("File prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `<Videos or home>/Recordings`
fn default_output_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from);

    match home {
        Some(home) => {
            let videos = ["Videos", "Movies"]
                .iter()
                .map(|name| home.join(name))
                .find(|dir| dir.is_dir())
                .unwrap_or(home);
            videos.join("Recordings")
        }
        None => PathBuf::from("Recordings"),
    }
}
