//! Video filter graph construction
//!
//! Stages run in a fixed order and each one is switched on independently:
//! fallback crop, denoise, color grade, cursor emphasis, border, watermark,
//! timestamp, scale. A webcam overlay turns the single-input chain into a
//! two-input composite that runs ahead of the other stages.

use super::types::{CornerPosition, FrameSize};
use crate::capture::CropRect;
use crate::recorder::options::RecordingOptions;
use serde::Serialize;

/// Output label of the composed video stream
pub const VIDEO_LABEL: &str = "[vout]";

pub const DENOISE: &str = "hqdn3d=2:1:2:1";
pub const CURSOR_EMPHASIS: &str = "eq=brightness=0.05:saturation=1.1";
pub const BORDER: &str = "pad=iw+8:ih+8:4:4:color=0x333333";
pub const TIMESTAMP: &str = "drawtext=text='%{localtime}':fontsize=20:fontcolor=white@0.8:x=10:y=10";

/// Margin between the webcam inset and the frame edge
const OVERLAY_MARGIN: u32 = 20;

/// Video half of the encoder invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "graph", rename_all = "lowercase")]
pub enum VideoGraph {
    /// Frames go to the encoder untouched
    Passthrough,
    /// Single-input chain, usable with `-vf`
    Chain(String),
    /// Multi-input graph ending in [`VIDEO_LABEL`], needs `-filter_complex`
    Composite(String),
}

impl VideoGraph {
    /// Graph text for `-filter_complex`, turning a plain chain into a labelled one
    pub fn complex_graph(&self) -> Option<String> {
        match self {
            VideoGraph::Passthrough => None,
            VideoGraph::Chain(chain) => Some(format!("[0:v]{chain}{VIDEO_LABEL}")),
            VideoGraph::Composite(graph) => Some(graph.clone()),
        }
    }
}

/// Inputs to the filter builder that do not live in [`RecordingOptions`]
#[derive(Debug, Clone)]
pub struct FilterContext<'a> {
    /// Frame size the capture delivers after any crop
    pub capture: FrameSize,
    /// Crop required because the backend cannot isolate the source
    pub crop: Option<CropRect>,
    /// `-i` index of the webcam, when the overlay is on
    pub webcam_input: Option<usize>,
    pub watermark_text: &'a str,
}

/// Build the video filter graph for one segment
pub fn build_video_graph(options: &RecordingOptions, ctx: &FilterContext<'_>) -> VideoGraph {
    let stages = chain_stages(options, ctx);

    match ctx.webcam_input {
        Some(webcam) => VideoGraph::Composite(composite(options, ctx, webcam, &stages)),
        None => {
            let mut all = Vec::with_capacity(stages.len() + 1);
            if let Some(crop) = ctx.crop {
                all.push(crop.filter());
            }
            all.extend(stages);

            if all.is_empty() {
                VideoGraph::Passthrough
            } else {
                VideoGraph::Chain(all.join(","))
            }
        }
    }
}

/// Single-input stages after any crop/composite, in their fixed order
fn chain_stages(options: &RecordingOptions, ctx: &FilterContext<'_>) -> Vec<String> {
    let mut stages = Vec::new();

    if options.quality.wants_denoise() {
        stages.push(DENOISE.to_string());
    }

    if let Some(grade) = options.effective_grade() {
        stages.push(grade.filter().to_string());
    }

    if options.cursor_highlight && options.show_cursor {
        stages.push(CURSOR_EMPHASIS.to_string());
    }

    if options.border {
        stages.push(BORDER.to_string());
    }

    if options.watermark {
        let fontsize = ((ctx.capture.height as f64 * 0.025).floor() as u32).max(1);
        stages.push(format!(
            "drawtext=text='{}':fontsize={}:fontcolor=white@0.7:x=w-tw-20:y=20",
            escape_drawtext(ctx.watermark_text),
            fontsize
        ));
    }

    if options.timestamp {
        stages.push(TIMESTAMP.to_string());
    }

    if let Some((width, height)) = options.resolution.dimensions() {
        if FrameSize::new(width, height) != ctx.capture {
            stages.push(format!("scale={width}x{height}:flags=lanczos"));
        }
    }

    stages
}

fn composite(
    options: &RecordingOptions,
    ctx: &FilterContext<'_>,
    webcam: usize,
    stages: &[String],
) -> String {
    let base = ctx
        .crop
        .map(|crop| crop.filter())
        .unwrap_or_else(|| "null".to_string());

    let inset_width = FrameSize::new(
        (ctx.capture.width as f64 * options.webcam.scale).floor() as u32,
        2,
    )
    .even()
    .width;

    let mut overlay = format!("overlay={}", overlay_position(options.webcam.position));
    for stage in stages {
        overlay.push(',');
        overlay.push_str(stage);
    }

    format!(
        "[0:v]{base}[base];[{webcam}:v]scale={inset_width}:-2[cam];[base][cam]{overlay}{VIDEO_LABEL}"
    )
}

fn overlay_position(corner: CornerPosition) -> String {
    let m = OVERLAY_MARGIN;
    match corner {
        CornerPosition::TopLeft => format!("{m}:{m}"),
        CornerPosition::TopRight => format!("W-w-{m}:{m}"),
        CornerPosition::BottomLeft => format!("{m}:H-h-{m}"),
        CornerPosition::BottomRight => format!("W-w-{m}:H-h-{m}"),
    }
}

/// Escape text for use inside a single-quoted `drawtext` value.
///
/// A quote cannot be escaped inside quotes, so `'` closes the quoted run,
/// adds an escaped quote and reopens it. Backslashes left inside the quotes
/// reach drawtext, which uses them to keep `%` and `:` literal.
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str("'\\''"),
            '\\' | ':' | '%' | ',' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
