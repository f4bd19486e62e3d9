//! Capture device discovery
//!
//! FFmpeg reports its input devices as human-oriented text on a diagnostic
//! stream. The parsers here are pure so each backend's format can be tested
//! without the binary; [`FfmpegDeviceEnumerator`] only runs the listing
//! command and hands the text over.

use super::traits::{AudioDeviceInfo, CameraInfo, DeviceEnumerator, Platform};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Device kind announced by a dshow/avfoundation section header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Audio,
    Video,
}

/// Parse `ffmpeg -f dshow -list_devices true -i dummy` output.
///
/// Handles both the older layout (section headers followed by quoted names)
/// and the newer one where each name line ends in `(audio)` or `(video)`.
pub fn parse_dshow_devices(output: &str) -> (Vec<AudioDeviceInfo>, Vec<CameraInfo>) {
    let mut audio = Vec::new();
    let mut video = Vec::new();
    let mut section = Section::None;

    for line in output.lines() {
        if line.contains("DirectShow audio devices") {
            section = Section::Audio;
            continue;
        }
        if line.contains("DirectShow video devices") {
            section = Section::Video;
            continue;
        }
        if line.contains("Alternative name") {
            continue;
        }

        let Some(name) = quoted(line) else { continue };
        let kind = if line.trim_end().ends_with("(audio)") {
            Section::Audio
        } else if line.trim_end().ends_with("(video)") {
            Section::Video
        } else {
            section
        };

        match kind {
            Section::Audio => audio.push(AudioDeviceInfo {
                id: name.to_string(),
                name: name.to_string(),
                is_default: audio.is_empty(),
            }),
            Section::Video => video.push(CameraInfo {
                id: name.to_string(),
                name: name.to_string(),
            }),
            Section::None => {}
        }
    }

    (audio, video)
}

/// Parse `ffmpeg -f avfoundation -list_devices true -i ""` output.
///
/// Screen capture entries are not cameras and are skipped.
pub fn parse_avfoundation_devices(output: &str) -> (Vec<AudioDeviceInfo>, Vec<CameraInfo>) {
    let mut audio = Vec::new();
    let mut video = Vec::new();
    let mut section = Section::None;

    for line in output.lines() {
        if line.contains("AVFoundation audio devices") {
            section = Section::Audio;
            continue;
        }
        if line.contains("AVFoundation video devices") {
            section = Section::Video;
            continue;
        }

        // `[AVFoundation indev @ 0x...] [0] FaceTime HD Camera`
        let Some(rest) = line.split("] [").nth(1) else { continue };
        let Some((index, name)) = rest.split_once("] ") else { continue };
        if index.parse::<u32>().is_err() {
            continue;
        }
        let name = name.trim();

        match section {
            Section::Audio => audio.push(AudioDeviceInfo {
                id: index.to_string(),
                name: name.to_string(),
                is_default: audio.is_empty(),
            }),
            Section::Video if !name.starts_with("Capture screen") => video.push(CameraInfo {
                id: index.to_string(),
                name: name.to_string(),
            }),
            _ => {}
        }
    }

    (audio, video)
}

/// Parse `ffmpeg -sources <backend>` output (pulse, v4l2).
///
/// Each entry is `<id> [<description>]`; a leading `*` marks the default.
pub fn parse_source_list(output: &str) -> Vec<AudioDeviceInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.contains("Auto-detected sources"))
        .filter_map(|line| {
            let trimmed = line.trim();
            let (is_default, entry) = match trimmed.strip_prefix('*') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, trimmed),
            };

            let (id, name) = match entry.split_once(" [") {
                Some((id, desc)) => (id.trim(), desc.trim_end_matches(']').trim()),
                None => (entry, entry),
            };
            if id.is_empty() {
                return None;
            }

            Some(AudioDeviceInfo {
                id: id.to_string(),
                name: name.to_string(),
                is_default,
            })
        })
        .collect()
}

fn quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    let name = &line[start..start + len];
    (!name.is_empty()).then_some(name)
}

/// Encoder input arguments that open an audio device
pub fn audio_input_args(platform: Platform, device_id: &str) -> Vec<String> {
    let (format, input) = match platform {
        Platform::Windows => ("dshow", format!("audio={device_id}")),
        Platform::MacOs => ("avfoundation", format!(":{device_id}")),
        Platform::Linux => ("pulse", device_id.to_string()),
    };
    vec!["-f".into(), format.into(), "-i".into(), input]
}

/// Encoder input arguments that open a webcam
pub fn camera_input_args(platform: Platform, device_id: &str, frame_rate: u32) -> Vec<String> {
    let (format, input) = match platform {
        Platform::Windows => ("dshow", format!("video={device_id}")),
        Platform::MacOs => ("avfoundation", format!("{device_id}:none")),
        Platform::Linux => ("v4l2", device_id.to_string()),
    };
    vec![
        "-f".into(),
        format.into(),
        "-framerate".into(),
        frame_rate.to_string(),
        "-i".into(),
        input,
    ]
}

/// Lists devices by asking the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegDeviceEnumerator {
    ffmpeg_path: PathBuf,
    platform: Platform,
}

impl FfmpegDeviceEnumerator {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            platform,
        }
    }

    /// Run ffmpeg with `args` and return stdout and stderr joined.
    /// ffmpeg exits non-zero for `-list_devices` runs, so the status is ignored.
    async fn listing(&self, args: &[&str]) -> Option<String> {
        tracing::debug!("Listing devices: {:?} {:?}", self.ffmpeg_path, args);

        let output = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push('\n');
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Some(text)
            }
            Err(e) => {
                tracing::warn!("Device listing failed ({:?}): {}", self.ffmpeg_path, e);
                None
            }
        }
    }

    async fn list_native(&self) -> (Vec<AudioDeviceInfo>, Vec<CameraInfo>) {
        match self.platform {
            Platform::Windows => self
                .listing(&["-f", "dshow", "-list_devices", "true", "-i", "dummy"])
                .await
                .map(|text| parse_dshow_devices(&text))
                .unwrap_or_default(),
            Platform::MacOs => self
                .listing(&["-f", "avfoundation", "-list_devices", "true", "-i", ""])
                .await
                .map(|text| parse_avfoundation_devices(&text))
                .unwrap_or_default(),
            Platform::Linux => {
                let audio = self
                    .listing(&["-sources", "pulse"])
                    .await
                    .map(|text| parse_source_list(&text))
                    .unwrap_or_default();
                let video = self
                    .listing(&["-sources", "v4l2"])
                    .await
                    .map(|text| {
                        parse_source_list(&text)
                            .into_iter()
                            .map(|d| CameraInfo { id: d.id, name: d.name })
                            .collect()
                    })
                    .unwrap_or_default();
                (audio, video)
            }
        }
    }
}

#[async_trait]
impl DeviceEnumerator for FfmpegDeviceEnumerator {
    async fn audio_devices(&self) -> Vec<AudioDeviceInfo> {
        let (audio, _) = self.list_native().await;
        if audio.is_empty() {
            tracing::warn!("No audio devices reported on {:?}", self.platform);
        }
        audio
    }

    async fn video_devices(&self) -> Vec<CameraInfo> {
        self.list_native().await.1
    }
}

/// Fixed device lists, for hosts that enumerate devices themselves
#[derive(Debug, Clone, Default)]
pub struct StaticDevices {
    pub audio: Vec<AudioDeviceInfo>,
    pub video: Vec<CameraInfo>,
}

impl StaticDevices {
    pub fn new(audio: Vec<AudioDeviceInfo>, video: Vec<CameraInfo>) -> Self {
        Self { audio, video }
    }

    /// Audio devices whose id and name are the given strings
    pub fn audio_named(names: &[&str]) -> Self {
        let audio = names
            .iter()
            .enumerate()
            .map(|(i, name)| AudioDeviceInfo {
                id: name.to_string(),
                name: name.to_string(),
                is_default: i == 0,
            })
            .collect();
        Self::new(audio, Vec::new())
    }
}

#[async_trait]
impl DeviceEnumerator for StaticDevices {
    async fn audio_devices(&self) -> Vec<AudioDeviceInfo> {
        self.audio.clone()
    }

    async fn video_devices(&self) -> Vec<CameraInfo> {
        self.video.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSHOW_LEGACY: &str = r#"[dshow @ 000001] DirectShow video devices (some may be both video and audio devices)
[dshow @ 000001]  "Integrated Webcam"
[dshow @ 000001]     Alternative name "@device_pnp_\\?\usb#vid_0c45"
[dshow @ 000001] DirectShow audio devices
[dshow @ 000001]  "Microphone (Realtek Audio)"
[dshow @ 000001]     Alternative name "@device_cm_{33D9A762}\wave_{A1}"
[dshow @ 000001]  "Stereo Mix (Realtek Audio)"
dummy: Immediate exit requested"#;

    const DSHOW_TAGGED: &str = r#"[dshow @ 0000022] "Integrated Webcam" (video)
[dshow @ 0000022]   Alternative name "@device_pnp_\\?\usb"
[dshow @ 0000022] "Headset Microphone" (audio)
[dshow @ 0000022]   Alternative name "@device_cm_{33D9A762}""#;

    const AVFOUNDATION: &str = "[AVFoundation indev @ 0x7f8] AVFoundation video devices:
[AVFoundation indev @ 0x7f8] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f8] [1] Capture screen 0
[AVFoundation indev @ 0x7f8] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8] [0] MacBook Pro Microphone
[AVFoundation indev @ 0x7f8] [1] BlackHole 2ch
: Input/output error";

    const PULSE: &str = "Auto-detected sources for pulse:
* alsa_input.pci-0000_00_1f.3.analog-stereo [Built-in Audio Analog Stereo]
  alsa_output.pci-0000_00_1f.3.analog-stereo.monitor [Monitor of Built-in Audio Analog Stereo]
";

    #[test]
    fn test_parse_dshow_legacy_sections() {
        let (audio, video) = parse_dshow_devices(DSHOW_LEGACY);
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].name, "Integrated Webcam");
        let names: Vec<_> = audio.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Microphone (Realtek Audio)", "Stereo Mix (Realtek Audio)"]);
        assert!(audio[0].is_default);
        assert!(!audio[1].is_default);
    }

    #[test]
    fn test_parse_dshow_tagged_lines() {
        let (audio, video) = parse_dshow_devices(DSHOW_TAGGED);
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].id, "Headset Microphone");
        assert_eq!(video[0].id, "Integrated Webcam");
    }

    #[test]
    fn test_parse_avfoundation() {
        let (audio, video) = parse_avfoundation_devices(AVFOUNDATION);
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].id, "0");
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[1].id, "1");
        assert_eq!(audio[1].name, "BlackHole 2ch");
    }

    #[test]
    fn test_parse_pulse_sources() {
        let devices = parse_source_list(PULSE);
        assert_eq!(devices.len(), 2);
        assert!(devices[0].is_default);
        assert_eq!(devices[0].id, "alsa_input.pci-0000_00_1f.3.analog-stereo");
        assert_eq!(devices[1].name, "Monitor of Built-in Audio Analog Stereo");
    }

    #[test]
    fn test_audio_input_args_per_platform() {
        assert_eq!(
            audio_input_args(Platform::Windows, "Mic"),
            ["-f", "dshow", "-i", "audio=Mic"]
        );
        assert_eq!(audio_input_args(Platform::MacOs, "1"), ["-f", "avfoundation", "-i", ":1"]);
        assert_eq!(audio_input_args(Platform::Linux, "default"), ["-f", "pulse", "-i", "default"]);
    }

    #[tokio::test]
    async fn test_missing_binary_degrades_to_empty() {
        let enumerator = FfmpegDeviceEnumerator::new("/nonexistent/ffmpeg-binary", Platform::Linux);
        assert!(enumerator.audio_devices().await.is_empty());
        assert!(enumerator.video_devices().await.is_empty());
    }
}
