//! Encoder invocation assembly
//!
//! Puts the capture directive, webcam and audio inputs, filter graph and
//! codec options of a plan into one ffmpeg argument list.

use super::filters::{VideoGraph, VIDEO_LABEL};
use super::planner::EncoderPlan;
use crate::capture::devices::camera_input_args;
use crate::capture::{CaptureDirective, Platform};
use std::path::Path;

/// Arguments every invocation starts with
fn global_args() -> Vec<String> {
    ["-hide_banner", "-nostats", "-loglevel", "info", "-y", "-progress", "pipe:1"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Inputs of one capture segment
#[derive(Debug, Clone)]
pub struct SegmentInputs<'a> {
    pub platform: Platform,
    pub capture: Option<&'a CaptureDirective>,
    pub webcam_device: Option<&'a str>,
}

/// Full argument list for a capture segment writing to `output`
pub fn capture_args(inputs: &SegmentInputs<'_>, plan: &EncoderPlan, output: &Path) -> Vec<String> {
    let mut args = global_args();

    if let Some(capture) = inputs.capture.filter(|_| plan.has_video) {
        args.extend(capture.input_args());
    }
    if let (Some(device), Some(_)) = (inputs.webcam_device, plan.webcam_input) {
        args.extend(camera_input_args(inputs.platform, device, plan.frame_rate));
    }
    args.extend(plan.audio.input_args(inputs.platform));

    // Video and audio graphs share one -filter_complex when either needs it
    let mix = plan.audio.mix_graph(plan.audio_enhancement);
    let needs_complex = mix.is_some() || matches!(plan.video, VideoGraph::Composite(_));

    if plan.has_video {
        if needs_complex {
            let mut graphs = Vec::new();
            let video_label = match plan.video.complex_graph() {
                Some(graph) => {
                    graphs.push(graph);
                    VIDEO_LABEL.to_string()
                }
                None => "0:v".to_string(),
            };
            graphs.extend(mix);
            args.extend(["-filter_complex".to_string(), graphs.join(";")]);
            args.extend(["-map".to_string(), video_label]);
        } else {
            if let VideoGraph::Chain(chain) = &plan.video {
                args.extend(["-vf".to_string(), chain.clone()]);
            }
            args.extend(["-map".to_string(), "0:v".to_string()]);
        }
    } else if let Some(mix) = mix {
        args.extend(["-filter_complex".to_string(), mix]);
    }

    args.extend(plan.audio.map_args());
    args.extend(plan.video_codec_args());
    args.extend(plan.audio.codec_args(plan.audio_enhancement));
    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args.push(output.to_string_lossy().into_owned());

    args
}

/// Stream-copy concatenation of the files listed in `list` into `output`
pub fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}
