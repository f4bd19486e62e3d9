//! Capture trait definitions
//!
//! Platform-agnostic descriptions of what can be captured, and the narrow
//! traits the recorder uses to discover it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Host platform, which decides the FFmpeg capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Whether FFmpeg can grab a single window by title/id on this platform
    pub fn has_native_window_capture(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Whether FFmpeg can grab an offset rectangle of the desktop directly
    pub fn has_native_area_capture(&self) -> bool {
        matches!(self, Platform::Windows | Platform::Linux)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Index used by the capture backend
    pub id: u32,

    /// Display name
    pub name: String,

    /// Origin of the display in the virtual desktop
    pub x: i32,
    pub y: i32,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Scale factor (e.g., 2.0 for Retina)
    pub scale_factor: f64,

    /// Whether this is the primary display
    pub is_primary: bool,
}

impl DisplayInfo {
    /// Physical pixel size (logical size times scale factor)
    pub fn pixel_size(&self) -> (u32, u32) {
        let scale = if self.scale_factor > 0.0 { self.scale_factor } else { 1.0 };
        (
            (self.width as f64 * scale).floor() as u32,
            (self.height as f64 * scale).floor() as u32,
        )
    }

    pub fn bounds(&self) -> WindowBounds {
        WindowBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Whether a point lies on this display
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && (x as i64) < self.x as i64 + self.width as i64
            && (y as i64) < self.y as i64 + self.height as i64
    }
}

/// Information about a capture window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    /// Opaque window id handed out by the host
    pub id: String,

    /// Window title
    pub title: String,

    /// Application name
    #[serde(default)]
    pub app_name: String,

    /// Window bounds in virtual desktop coordinates
    pub bounds: WindowBounds,
}

/// Rectangle in virtual desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Information about an audio device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Identifier passed to the capture backend
    pub id: String,

    /// Device name
    pub name: String,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
}

/// Source of displays and windows the user may pick from
pub trait SourceProvider: Send + Sync {
    fn displays(&self) -> Vec<DisplayInfo>;
    fn windows(&self) -> Vec<WindowInfo>;
}

/// Enumerates capture devices the encoder can open
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// Audio inputs (microphones and loopback/system devices)
    async fn audio_devices(&self) -> Vec<AudioDeviceInfo>;

    /// Video inputs usable for the webcam overlay
    async fn video_devices(&self) -> Vec<CameraInfo>;
}

/// Source provider backed by lists supplied by the host application
#[derive(Debug, Clone)]
pub struct StaticSources {
    displays: Vec<DisplayInfo>,
    windows: Vec<WindowInfo>,
}

impl StaticSources {
    pub fn new(displays: Vec<DisplayInfo>, windows: Vec<WindowInfo>) -> Self {
        Self { displays, windows }
    }

    /// Single primary display of the given size
    pub fn primary(width: u32, height: u32) -> Self {
        Self::new(
            vec![DisplayInfo {
                id: 0,
                name: "Primary Display".to_string(),
                x: 0,
                y: 0,
                width,
                height,
                scale_factor: 1.0,
                is_primary: true,
            }],
            Vec::new(),
        )
    }

    pub fn with_windows(mut self, windows: Vec<WindowInfo>) -> Self {
        self.windows = windows;
        self
    }
}

impl Default for StaticSources {
    fn default() -> Self {
        Self::primary(1920, 1080)
    }
}

impl SourceProvider for StaticSources {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.displays.clone()
    }

    fn windows(&self) -> Vec<WindowInfo> {
        self.windows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_applies_scale() {
        let mut display = StaticSources::primary(1440, 900).displays().remove(0);
        display.scale_factor = 2.0;
        assert_eq!(display.pixel_size(), (2880, 1800));
    }

    #[test]
    fn test_display_contains() {
        let display = StaticSources::primary(1920, 1080).displays().remove(0);
        assert!(display.contains(0, 0));
        assert!(display.contains(1919, 1079));
        assert!(!display.contains(1920, 10));
        assert!(!display.contains(-1, 10));
    }
}
