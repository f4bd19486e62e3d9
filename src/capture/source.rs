//! Capture source resolution
//!
//! Turns a logical source (display, window, area) into the FFmpeg input
//! directive for the host platform. Where the backend cannot grab a window
//! or rectangle by itself, the whole display is captured and an explicit
//! crop narrows it down before any other filter runs.

use super::traits::{DisplayInfo, Platform, SourceProvider, WindowBounds};
use crate::ffmpeg::types::FrameSize;
use crate::recorder::options::{RecordingOptions, SourceKind};
use crate::utils::{RecorderError, RecorderResult};
use serde::Serialize;

/// Crop rectangle in captured pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// `crop` filter for this rectangle
    pub fn filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

/// How the encoder should open the video source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureDirective {
    /// FFmpeg input format (`gdigrab`, `avfoundation`, `x11grab`)
    pub format: &'static str,
    /// Device selector passed to `-i`
    pub input: String,
    /// Options placed before `-i`
    pub input_options: Vec<String>,
    /// Frame size the filter chain receives (after any crop)
    pub geometry: FrameSize,
    /// Crop the filter chain must apply first
    pub crop: Option<CropRect>,
}

impl CaptureDirective {
    /// Arguments that open this input
    pub fn input_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.format.to_string()];
        args.extend(self.input_options.iter().cloned());
        args.extend(["-i".to_string(), self.input.clone()]);
        args
    }
}

/// Resolves capture directives for one platform
#[derive(Debug, Clone)]
pub struct SourceResolver {
    platform: Platform,
    /// X11 display string used by x11grab
    x11_display: String,
}

impl SourceResolver {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            x11_display: ":0.0".to_string(),
        }
    }

    pub fn with_x11_display(mut self, display: impl Into<String>) -> Self {
        self.x11_display = display.into();
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolve the video input for `options`. Audio-only sessions have none.
    pub fn resolve(
        &self,
        options: &RecordingOptions,
        sources: &dyn SourceProvider,
    ) -> RecorderResult<Option<CaptureDirective>> {
        if options.source == SourceKind::AudioOnly {
            return Ok(None);
        }

        let displays = sources.displays();
        if displays.is_empty() {
            return Err(RecorderError::ResourceUnavailable(
                "No screen sources available".to_string(),
            ));
        }

        let selected = displays
            .iter()
            .find(|d| d.id == options.display_index)
            .or_else(|| displays.get(options.display_index as usize))
            .ok_or_else(|| {
                RecorderError::ResourceUnavailable(format!(
                    "Display {} not found ({} available)",
                    options.display_index,
                    displays.len()
                ))
            })?;

        let directive = match options.source {
            SourceKind::FullScreen => self.full_display(selected, options),
            SourceKind::Window => {
                let window_id = options.window_id.as_deref().unwrap_or_default();
                let window = sources
                    .windows()
                    .into_iter()
                    .find(|w| w.id == window_id)
                    .ok_or_else(|| {
                        RecorderError::ResourceUnavailable(format!("Window {window_id} not found"))
                    })?;

                if self.platform.has_native_window_capture() {
                    self.native_window(&window.title, window.bounds, options)
                } else {
                    let owner = owning_display(&displays, window.bounds).unwrap_or(selected);
                    tracing::info!(
                        "No native window capture on {:?}; cropping display {} to window {:?}",
                        self.platform,
                        owner.id,
                        window.title
                    );
                    self.cropped_display(owner, window.bounds, options)?
                }
            }
            SourceKind::Area => {
                let area = options.area.ok_or_else(|| {
                    RecorderError::Validation("Area capture requires an area".to_string())
                })?;
                let display = owning_display(&displays, area).unwrap_or(selected);

                if self.platform.has_native_area_capture() {
                    self.native_area(display, area, options)?
                } else {
                    self.cropped_display(display, area, options)?
                }
            }
            SourceKind::AudioOnly => return Ok(None),
        };

        tracing::debug!(
            "Resolved {:?} capture: -f {} -i {} ({}), crop={:?}",
            options.source,
            directive.format,
            directive.input,
            directive.geometry,
            directive.crop
        );

        Ok(Some(directive))
    }

    fn cursor_options(&self, options: &RecordingOptions) -> Vec<String> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();
        match self.platform {
            Platform::Windows | Platform::Linux => {
                vec!["-draw_mouse".to_string(), flag(options.show_cursor)]
            }
            Platform::MacOs => vec![
                "-capture_cursor".to_string(),
                flag(options.show_cursor),
                "-capture_mouse_clicks".to_string(),
                flag(options.show_cursor && options.cursor_highlight),
            ],
        }
    }

    fn base_options(&self, options: &RecordingOptions) -> Vec<String> {
        let mut args = vec!["-framerate".to_string(), options.frame_rate.to_string()];
        args.extend(self.cursor_options(options));
        args
    }

    fn full_display(&self, display: &DisplayInfo, options: &RecordingOptions) -> CaptureDirective {
        let (width, height) = display.pixel_size();
        let geometry = FrameSize::new(width, height);
        let mut input_options = self.base_options(options);

        let (format, input) = match self.platform {
            Platform::Windows => {
                input_options.extend([
                    "-offset_x".to_string(),
                    display.x.to_string(),
                    "-offset_y".to_string(),
                    display.y.to_string(),
                    "-video_size".to_string(),
                    geometry.to_string(),
                ]);
                ("gdigrab", "desktop".to_string())
            }
            Platform::MacOs => ("avfoundation", format!("{}:none", display.id)),
            Platform::Linux => {
                input_options.extend(["-video_size".to_string(), geometry.to_string()]);
                (
                    "x11grab",
                    format!("{}+{},{}", self.x11_display, display.x, display.y),
                )
            }
        };

        CaptureDirective {
            format,
            input,
            input_options,
            geometry: geometry.even(),
            crop: None,
        }
    }

    fn native_window(
        &self,
        title: &str,
        bounds: WindowBounds,
        options: &RecordingOptions,
    ) -> CaptureDirective {
        CaptureDirective {
            format: "gdigrab",
            input: format!("title={title}"),
            input_options: self.base_options(options),
            geometry: FrameSize::new(bounds.width, bounds.height).even(),
            crop: None,
        }
    }

    fn native_area(
        &self,
        display: &DisplayInfo,
        area: WindowBounds,
        options: &RecordingOptions,
    ) -> RecorderResult<CaptureDirective> {
        let rect = clip_to_display(display, area)?;
        let size = FrameSize::new(rect.width, rect.height).even();
        let abs_x = display.x + rect.x as i32;
        let abs_y = display.y + rect.y as i32;

        let mut input_options = self.base_options(options);
        let (format, input) = match self.platform {
            Platform::Linux => ("x11grab", format!("{}+{},{}", self.x11_display, abs_x, abs_y)),
            _ => {
                input_options.extend([
                    "-offset_x".to_string(),
                    abs_x.to_string(),
                    "-offset_y".to_string(),
                    abs_y.to_string(),
                ]);
                ("gdigrab", "desktop".to_string())
            }
        };
        input_options.extend(["-video_size".to_string(), size.to_string()]);

        Ok(CaptureDirective {
            format,
            input,
            input_options,
            geometry: size,
            crop: None,
        })
    }

    fn cropped_display(
        &self,
        display: &DisplayInfo,
        bounds: WindowBounds,
        options: &RecordingOptions,
    ) -> RecorderResult<CaptureDirective> {
        let rect = clip_to_display(display, bounds)?;
        let mut directive = self.full_display(display, options);

        // Bounds are logical points, the grabber delivers physical pixels
        let scale = if display.scale_factor > 0.0 { display.scale_factor } else { 1.0 };
        let scaled = |v: u32| (v as f64 * scale).floor() as u32;
        let size = FrameSize::new(scaled(rect.width), scaled(rect.height)).even();

        let crop = CropRect {
            x: scaled(rect.x),
            y: scaled(rect.y),
            width: size.width,
            height: size.height,
        };

        directive.geometry = size;
        directive.crop = Some(crop);
        Ok(directive)
    }
}

/// Display whose area contains the rectangle's origin
fn owning_display(displays: &[DisplayInfo], rect: WindowBounds) -> Option<&DisplayInfo> {
    displays.iter().find(|d| d.contains(rect.x, rect.y))
}

/// Rectangle relative to the display origin, offsets clamped to zero and the
/// size clipped to the display bounds.
fn clip_to_display(display: &DisplayInfo, rect: WindowBounds) -> RecorderResult<CropRect> {
    let rel_x = rect.x as i64 - display.x as i64;
    let rel_y = rect.y as i64 - display.y as i64;

    // Whatever hangs off the left/top edge is lost from the size too
    let visible_w = rect.width as i64 + rel_x.min(0);
    let visible_h = rect.height as i64 + rel_y.min(0);
    let x = rel_x.max(0);
    let y = rel_y.max(0);

    let width = visible_w.min(display.width as i64 - x);
    let height = visible_h.min(display.height as i64 - y);

    if width <= 0 || height <= 0 {
        return Err(RecorderError::ResourceUnavailable(format!(
            "Capture region {:?} is outside display {}",
            rect, display.id
        )));
    }

    Ok(CropRect {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    })
}
