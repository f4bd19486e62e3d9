//! Recording options
//!
//! The user's capture request, its upfront validation, and the named presets
//! that fill it in.

use crate::capture::WindowBounds;
use crate::ffmpeg::types::{ColorGrade, CornerPosition, PreferredCodec, QualityTier, ResolutionTier};
use crate::utils::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Frame rates the encoder accepts
pub const FRAME_RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=120;

/// Longest countdown a session may request
pub const MAX_COUNTDOWN_SECS: u32 = 60;

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    #[serde(alias = "screen")]
    FullScreen,
    Window,
    Area,
    AudioOnly,
}

impl Default for SourceKind {
    fn default() -> Self {
        Self::FullScreen
    }
}

/// Picture-in-picture webcam overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebcamOptions {
    pub enabled: bool,
    pub device_id: Option<String>,
    /// Inset width as a fraction of the primary frame width
    pub scale: f64,
    pub position: CornerPosition,
}

impl Default for WebcamOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            device_id: None,
            scale: 0.25,
            position: CornerPosition::TopRight,
        }
    }
}

/// Options for one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingOptions {
    pub source: SourceKind,
    pub display_index: u32,
    pub window_id: Option<String>,
    pub area: Option<WindowBounds>,
    pub frame_rate: u32,
    pub resolution: ResolutionTier,
    pub quality: QualityTier,
    /// Seconds to count down before the first segment starts
    pub countdown: u32,
    pub system_audio_device: Option<String>,
    pub microphone_device: Option<String>,
    pub separate_audio_tracks: bool,
    pub audio_enhancement: bool,
    pub webcam: WebcamOptions,
    pub show_cursor: bool,
    pub cursor_highlight: bool,
    pub watermark: bool,
    pub timestamp: bool,
    pub border: bool,
    pub color_grading: bool,
    /// Explicit grade; the quality tier picks one otherwise
    pub color_grade: Option<ColorGrade>,
    pub preferred_codec: PreferredCodec,
    pub output_dir: Option<PathBuf>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            source: SourceKind::FullScreen,
            display_index: 0,
            window_id: None,
            area: None,
            frame_rate: 30,
            resolution: ResolutionTier::P1080,
            quality: QualityTier::High,
            countdown: 0,
            system_audio_device: None,
            microphone_device: None,
            separate_audio_tracks: false,
            audio_enhancement: false,
            webcam: WebcamOptions::default(),
            show_cursor: true,
            cursor_highlight: false,
            watermark: false,
            timestamp: false,
            border: false,
            color_grading: false,
            color_grade: None,
            preferred_codec: PreferredCodec::Auto,
            output_dir: None,
        }
    }
}

impl RecordingOptions {
    /// Parse options from loosely-shaped JSON, reporting unknown enum values
    /// (resolution, quality, ...) as validation failures.
    pub fn from_json(value: serde_json::Value) -> RecorderResult<Self> {
        serde_json::from_value(value).map_err(|e| RecorderError::Validation(e.to_string()))
    }

    /// Check every option and report all problems at once
    pub fn validate(&self) -> RecorderResult<()> {
        let mut errors = Vec::new();

        if !FRAME_RATE_RANGE.contains(&self.frame_rate) {
            errors.push(format!(
                "Frame rate must be between {} and {} FPS (got {})",
                FRAME_RATE_RANGE.start(),
                FRAME_RATE_RANGE.end(),
                self.frame_rate
            ));
        }

        if self.countdown > MAX_COUNTDOWN_SECS {
            errors.push(format!("Countdown must be at most {MAX_COUNTDOWN_SECS} seconds"));
        }

        match self.source {
            SourceKind::Window => {
                if self.window_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                    errors.push("Window capture requires a window id".to_string());
                }
            }
            SourceKind::Area => match self.area {
                Some(area) if area.width > 0 && area.height > 0 => {}
                _ => errors.push("Area capture requires a non-empty area".to_string()),
            },
            SourceKind::AudioOnly => {
                if !self.has_audio_request() {
                    errors.push("Audio-only capture requires an audio device".to_string());
                }
            }
            SourceKind::FullScreen => {}
        }

        if self.webcam.enabled {
            if !(self.webcam.scale > 0.0 && self.webcam.scale <= 1.0) {
                errors.push(format!(
                    "Webcam scale must be in (0, 1] (got {})",
                    self.webcam.scale
                ));
            }
            if self.webcam.device_id.as_deref().map_or(true, str::is_empty) {
                errors.push("Webcam overlay requires a device id".to_string());
            }
            if self.source == SourceKind::AudioOnly {
                errors.push("Webcam overlay needs a video source".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RecorderError::Validation(errors.join("; ")))
        }
    }

    /// Whether any audio device was asked for
    pub fn has_audio_request(&self) -> bool {
        self.system_audio_device.is_some() || self.microphone_device.is_some()
    }

    /// Grade the filter chain should apply, if any
    pub fn effective_grade(&self) -> Option<ColorGrade> {
        if !self.color_grading {
            return None;
        }
        self.color_grade.or_else(|| self.quality.default_grade())
    }
}

/// Named option bundles for common recording situations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Presentation,
    Webinar,
    Demo,
    Tutorial,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Presentation,
        Preset::Webinar,
        Preset::Demo,
        Preset::Tutorial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Presentation => "presentation",
            Preset::Webinar => "webinar",
            Preset::Demo => "demo",
            Preset::Tutorial => "tutorial",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        Preset::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Overlay this preset onto `options`, leaving source and devices alone
    pub fn apply(&self, options: &mut RecordingOptions) {
        options.resolution = ResolutionTier::P1080;
        options.audio_enhancement = true;
        options.show_cursor = true;
        options.color_grading = true;
        options.color_grade = Some(self.grade());

        match self {
            Preset::Presentation | Preset::Tutorial => {
                options.quality = QualityTier::High;
                options.frame_rate = 30;
                options.cursor_highlight = true;
                options.watermark = true;
                options.timestamp = false;
                options.border = false;
            }
            Preset::Webinar => {
                options.quality = QualityTier::Ultra;
                options.frame_rate = 30;
                options.cursor_highlight = false;
                options.watermark = true;
                options.timestamp = true;
                options.border = false;
            }
            Preset::Demo => {
                options.quality = QualityTier::High;
                options.frame_rate = 60;
                options.cursor_highlight = true;
                options.watermark = false;
                options.timestamp = false;
                options.border = true;
            }
        }
    }

    pub fn grade(&self) -> ColorGrade {
        match self {
            Preset::Presentation => ColorGrade::Presentation,
            Preset::Webinar => ColorGrade::Webinar,
            Preset::Demo => ColorGrade::Demo,
            Preset::Tutorial => ColorGrade::Tutorial,
        }
    }
}
