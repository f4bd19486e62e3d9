//! Capture sources
//!
//! Describes what can be recorded (displays, windows, devices) and how each
//! source maps onto an FFmpeg input on the host platform.

pub mod devices;
pub mod source;
pub mod traits;

pub use devices::{FfmpegDeviceEnumerator, StaticDevices};
pub use source::{CaptureDirective, CropRect, SourceResolver};
pub use traits::{
    AudioDeviceInfo, CameraInfo, DeviceEnumerator, DisplayInfo, Platform, SourceProvider,
    StaticSources, WindowBounds, WindowInfo,
};
