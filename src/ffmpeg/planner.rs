//! Encoder parameter planning
//!
//! Maps the quality tier and codec preference to concrete video encoder
//! settings, and bundles them with the filter graph and audio route into
//! the [`EncoderPlan`] for one segment. Hardware encoder availability is
//! detected once and cached until [`EncoderPlanner::refresh_encoders`].

use super::audio::AudioRoute;
use super::filters::{build_video_graph, FilterContext, VideoGraph};
use super::types::{PreferredCodec, VideoEncoder};
use crate::capture::{AudioDeviceInfo, CaptureDirective};
use crate::recorder::options::{RecordingOptions, SourceKind};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Bit allocation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RateControl {
    /// Software constant quality
    #[serde(rename_all = "camelCase")]
    ConstantQuality {
        preset: &'static str,
        crf: u8,
        profile: &'static str,
        level: &'static str,
    },
    /// Hardware bounded variable bitrate, all values in kbit/s
    #[serde(rename_all = "camelCase")]
    BoundedBitrate {
        target_kbps: u32,
        max_kbps: u32,
        buffer_kbps: u32,
    },
}

/// Everything the encoder needs to know for one segment, besides its inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderPlan {
    pub video_codec: VideoEncoder,
    pub rate_control: RateControl,
    pub video: VideoGraph,
    pub audio: AudioRoute,
    pub audio_enhancement: bool,
    pub frame_rate: u32,
    /// `-i` index of the webcam input, when the overlay is on
    pub webcam_input: Option<usize>,
    /// Whether a video stream is written at all
    pub has_video: bool,
}

impl EncoderPlan {
    /// Video codec, rate control and fixed color/container options
    pub fn video_codec_args(&self) -> Vec<String> {
        if !self.has_video {
            return vec!["-vn".to_string()];
        }

        let mut args = vec!["-c:v".to_string(), self.video_codec.as_ffmpeg_codec().to_string()];

        match &self.rate_control {
            RateControl::ConstantQuality { preset, crf, profile, level } => {
                args.extend([
                    "-preset".to_string(),
                    preset.to_string(),
                    "-crf".to_string(),
                    crf.to_string(),
                    "-profile:v".to_string(),
                    profile.to_string(),
                    "-level:v".to_string(),
                    level.to_string(),
                ]);
            }
            RateControl::BoundedBitrate { target_kbps, max_kbps, buffer_kbps } => {
                args.extend([
                    "-b:v".to_string(),
                    format!("{target_kbps}k"),
                    "-maxrate".to_string(),
                    format!("{max_kbps}k"),
                    "-bufsize".to_string(),
                    format!("{buffer_kbps}k"),
                ]);
            }
        }

        args.extend([
            "-r".to_string(),
            self.frame_rate.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-colorspace".to_string(),
            "bt709".to_string(),
            "-color_primaries".to_string(),
            "bt709".to_string(),
            "-color_trc".to_string(),
            "bt709".to_string(),
            "-color_range".to_string(),
            "tv".to_string(),
        ]);

        args
    }
}

/// Hardware encoders named in `ffmpeg -encoders` output, in priority order
pub fn parse_encoder_list(output: &str) -> Vec<VideoEncoder> {
    VideoEncoder::HARDWARE_PRIORITY
        .into_iter()
        .filter(|encoder| output.contains(encoder.as_ffmpeg_codec()))
        .collect()
}

/// Plans encoder parameters; owns the hardware encoder cache
#[derive(Debug)]
pub struct EncoderPlanner {
    ffmpeg_path: PathBuf,
    detected: RwLock<Option<Vec<VideoEncoder>>>,
}

impl EncoderPlanner {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            detected: RwLock::new(None),
        }
    }

    /// Planner whose hardware encoders are already known
    pub fn with_hardware(ffmpeg_path: impl Into<PathBuf>, hardware: Vec<VideoEncoder>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            detected: RwLock::new(Some(hardware)),
        }
    }

    /// Forget the cached encoder list so the next plan asks ffmpeg again
    pub fn refresh_encoders(&self) {
        *self.detected.write() = None;
    }

    /// Available hardware encoders, asking ffmpeg on first use
    pub async fn hardware_encoders(&self) -> Vec<VideoEncoder> {
        let cached = self.detected.read().clone();
        if let Some(cached) = cached {
            return cached;
        }

        let found = self.detect_hardware().await;
        *self.detected.write() = Some(found.clone());
        found
    }

    async fn detect_hardware(&self) -> Vec<VideoEncoder> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let found = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
                tracing::info!("Hardware encoders found: {:?}", found);
                found
            }
            Err(e) => {
                tracing::warn!("Encoder detection failed, using software encoding: {}", e);
                Vec::new()
            }
        }
    }

    /// Pick the encoder for a codec preference
    pub fn select_encoder(preferred: PreferredCodec, hardware: &[VideoEncoder]) -> VideoEncoder {
        match preferred {
            PreferredCodec::Software => VideoEncoder::X264,
            PreferredCodec::Auto => VideoEncoder::HARDWARE_PRIORITY
                .into_iter()
                .find(|encoder| hardware.contains(encoder))
                .unwrap_or(VideoEncoder::X264),
            named => match VideoEncoder::from_preference(named) {
                Some(encoder) if hardware.contains(&encoder) => encoder,
                _ => {
                    tracing::warn!(
                        "Requested encoder {:?} is not available, falling back to libx264",
                        named
                    );
                    VideoEncoder::X264
                }
            },
        }
    }

    /// Rate control for an encoder at the options' tier and resolution
    pub fn rate_control(encoder: VideoEncoder, options: &RecordingOptions) -> RateControl {
        let tier = options.quality;
        if encoder.is_hardware() {
            let target =
                (options.resolution.base_bitrate_kbps() as f64 * tier.bitrate_factor()).round() as u32;
            RateControl::BoundedBitrate {
                target_kbps: target,
                max_kbps: target + target / 2,
                buffer_kbps: target * 2,
            }
        } else {
            RateControl::ConstantQuality {
                preset: tier.h264_preset(),
                crf: tier.crf(),
                profile: tier.h264_profile(),
                level: tier.h264_level(),
            }
        }
    }

    /// Build the plan for one segment
    pub async fn plan(
        &self,
        options: &RecordingOptions,
        capture: Option<&CaptureDirective>,
        audio_devices: &[AudioDeviceInfo],
        watermark_text: &str,
    ) -> EncoderPlan {
        let has_video = capture.is_some() && options.source != SourceKind::AudioOnly;
        let webcam_input = (has_video && options.webcam.enabled).then_some(1);
        let video_inputs = usize::from(has_video) + usize::from(webcam_input.is_some());

        let audio = AudioRoute::resolve(
            options.system_audio_device.as_deref(),
            options.microphone_device.as_deref(),
            options.separate_audio_tracks,
            audio_devices,
            video_inputs,
        );

        let video = match capture {
            Some(directive) if has_video => build_video_graph(
                options,
                &FilterContext {
                    capture: directive.geometry,
                    crop: directive.crop,
                    webcam_input,
                    watermark_text,
                },
            ),
            _ => VideoGraph::Passthrough,
        };

        let video_codec = if has_video {
            let hardware = self.hardware_encoders().await;
            Self::select_encoder(options.preferred_codec, &hardware)
        } else {
            VideoEncoder::X264
        };

        let plan = EncoderPlan {
            video_codec,
            rate_control: Self::rate_control(video_codec, options),
            video,
            audio,
            audio_enhancement: options.audio_enhancement,
            frame_rate: options.frame_rate,
            webcam_input,
            has_video,
        };

        tracing::debug!(
            "Encoder plan: codec={:?} rate={:?} audio streams={}",
            plan.video_codec,
            plan.rate_control,
            plan.audio.output_streams()
        );

        plan
    }
}
