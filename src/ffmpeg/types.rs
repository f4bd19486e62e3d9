//! Encoder vocabulary
//!
//! Quality tiers, output resolutions, codec choices and color presets, and
//! the encoder parameters each of them implies.

use serde::{Deserialize, Serialize};

/// Quality levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::High
    }
}

impl QualityTier {
    /// CRF for software H.264. Lower values = higher quality, larger files
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Medium => 23,
            QualityTier::High => 18,
            QualityTier::Ultra => 15,
        }
    }

    /// x264 preset
    pub fn h264_preset(&self) -> &'static str {
        match self {
            QualityTier::Low => "veryfast",
            QualityTier::Medium => "medium",
            QualityTier::High | QualityTier::Ultra => "slow",
        }
    }

    pub fn h264_profile(&self) -> &'static str {
        match self {
            QualityTier::Low | QualityTier::Medium => "main",
            QualityTier::High | QualityTier::Ultra => "high",
        }
    }

    pub fn h264_level(&self) -> &'static str {
        match self {
            QualityTier::Low | QualityTier::Medium => "4.0",
            QualityTier::High => "4.1",
            QualityTier::Ultra => "4.2",
        }
    }

    /// Noise reduction is only worth its CPU cost on the top two tiers
    pub fn wants_denoise(&self) -> bool {
        matches!(self, QualityTier::High | QualityTier::Ultra)
    }

    /// Bitrate multiplier applied to a resolution's base bitrate
    pub fn bitrate_factor(&self) -> f64 {
        match self {
            QualityTier::Low => 0.5,
            QualityTier::Medium => 0.75,
            QualityTier::High => 1.0,
            QualityTier::Ultra => 1.5,
        }
    }

    /// Color grade used when the options do not name one
    pub fn default_grade(&self) -> Option<ColorGrade> {
        match self {
            QualityTier::Low => None,
            QualityTier::Medium => Some(ColorGrade::Tutorial),
            QualityTier::High => Some(ColorGrade::Presentation),
            QualityTier::Ultra => Some(ColorGrade::Webinar),
        }
    }
}

/// Output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "4K", alias = "4k")]
    Uhd4k,
    /// Keep whatever the capture source delivers
    #[serde(rename = "original")]
    Original,
}

impl Default for ResolutionTier {
    fn default() -> Self {
        Self::P1080
    }
}

impl ResolutionTier {
    /// Target frame size, `None` for [`ResolutionTier::Original`]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            ResolutionTier::P720 => Some((1280, 720)),
            ResolutionTier::P1080 => Some((1920, 1080)),
            ResolutionTier::P1440 => Some((2560, 1440)),
            ResolutionTier::Uhd4k => Some((3840, 2160)),
            ResolutionTier::Original => None,
        }
    }

    /// Base target bitrate in kbit/s for hardware rate control
    pub fn base_bitrate_kbps(&self) -> u32 {
        match self {
            ResolutionTier::P720 => 5_000,
            ResolutionTier::P1080 | ResolutionTier::Original => 8_000,
            ResolutionTier::P1440 => 16_000,
            ResolutionTier::Uhd4k => 35_000,
        }
    }
}

/// Codec the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredCodec {
    /// Best available hardware encoder, falling back to software
    Auto,
    /// Always libx264
    Software,
    Nvenc,
    Qsv,
    Amf,
    #[serde(alias = "videoToolbox")]
    Videotoolbox,
}

impl Default for PreferredCodec {
    fn default() -> Self {
        Self::Auto
    }
}

/// Concrete video encoder passed to FFmpeg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoder {
    Nvenc,
    Qsv,
    Amf,
    Videotoolbox,
    X264,
}

impl VideoEncoder {
    /// Hardware encoders in order of preference for `auto`
    pub const HARDWARE_PRIORITY: [VideoEncoder; 4] = [
        VideoEncoder::Nvenc,
        VideoEncoder::Qsv,
        VideoEncoder::Amf,
        VideoEncoder::Videotoolbox,
    ];

    pub fn as_ffmpeg_codec(&self) -> &'static str {
        match self {
            VideoEncoder::Nvenc => "h264_nvenc",
            VideoEncoder::Qsv => "h264_qsv",
            VideoEncoder::Amf => "h264_amf",
            VideoEncoder::Videotoolbox => "h264_videotoolbox",
            VideoEncoder::X264 => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, VideoEncoder::X264)
    }

    /// Hardware encoder a codec preference names, if any
    pub fn from_preference(codec: PreferredCodec) -> Option<VideoEncoder> {
        match codec {
            PreferredCodec::Nvenc => Some(VideoEncoder::Nvenc),
            PreferredCodec::Qsv => Some(VideoEncoder::Qsv),
            PreferredCodec::Amf => Some(VideoEncoder::Amf),
            PreferredCodec::Videotoolbox => Some(VideoEncoder::Videotoolbox),
            PreferredCodec::Auto | PreferredCodec::Software => None,
        }
    }
}

/// Color grading presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorGrade {
    Presentation,
    Webinar,
    Demo,
    Tutorial,
}

impl ColorGrade {
    /// `eq` filter for this grade
    pub fn filter(&self) -> &'static str {
        match self {
            ColorGrade::Presentation => "eq=brightness=0.02:saturation=1.1:gamma=0.95:contrast=1.05",
            ColorGrade::Webinar => "eq=brightness=0.05:saturation=1.05:gamma=0.9:contrast=1.1",
            ColorGrade::Demo => "eq=brightness=0.03:saturation=1.15:gamma=1.0:contrast=1.08",
            ColorGrade::Tutorial => "eq=brightness=0.01:saturation=1.08:gamma=0.98:contrast=1.03",
        }
    }
}

/// Corner the webcam inset is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Default for CornerPosition {
    fn default() -> Self {
        Self::TopRight
    }
}

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round both sides down to even numbers; yuv420p rejects odd sizes
    pub fn even(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
        }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
