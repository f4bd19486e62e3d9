//! Audio route building
//!
//! Decides which audio devices feed the encoder and how their streams reach
//! the output: one track, two tracks mixed into one, or two separate tracks.

use crate::capture::devices::audio_input_args;
use crate::capture::{AudioDeviceInfo, Platform};
use serde::Serialize;

/// Voice clean-up chain applied when enhancement is requested
pub const ENHANCEMENT_CHAIN: &str = "highpass=f=100,lowpass=f=8000,volume=1.2,dynaudnorm=f=75:g=25";

/// Output label of the mixed audio stream
pub const MIXED_LABEL: &str = "[aout]";

/// Which request a resolved device came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioRole {
    System,
    Microphone,
}

/// One audio device opened as an encoder input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInput {
    pub device: AudioDeviceInfo,
    pub role: AudioRole,
    /// Position of this input in the encoder's `-i` list
    pub input_index: usize,
}

/// How audio inputs map to output streams
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AudioRoute {
    None,
    Single { input: AudioInput },
    Mixed { inputs: [AudioInput; 2] },
    Separate { inputs: [AudioInput; 2] },
}

impl AudioRoute {
    /// Resolve the requested device ids against what is actually present.
    ///
    /// A requested id missing from `available` is replaced by the first
    /// available device. With nothing available audio is dropped.
    /// `first_input_index` is the `-i` position the first audio input gets.
    pub fn resolve(
        system: Option<&str>,
        microphone: Option<&str>,
        separate_tracks: bool,
        available: &[AudioDeviceInfo],
        first_input_index: usize,
    ) -> AudioRoute {
        let requested: Vec<(AudioRole, &str)> = [
            (AudioRole::System, system),
            (AudioRole::Microphone, microphone),
        ]
        .into_iter()
        .filter_map(|(role, id)| id.filter(|id| !id.is_empty()).map(|id| (role, id)))
        .collect();

        if requested.is_empty() {
            return AudioRoute::None;
        }

        let Some(fallback) = available.first() else {
            tracing::warn!(
                "Audio requested ({:?}) but no audio devices are available; recording without audio",
                requested
            );
            return AudioRoute::None;
        };

        let mut resolved: Vec<(AudioRole, AudioDeviceInfo)> = Vec::with_capacity(2);
        for (role, id) in requested {
            let device = match available.iter().find(|d| d.id == id) {
                Some(device) => device.clone(),
                None => {
                    tracing::warn!(
                        "Audio device {:?} not found; falling back to {:?}",
                        id,
                        fallback.name
                    );
                    fallback.clone()
                }
            };

            // Two requests landing on the same device open it once
            if resolved.iter().any(|(_, d)| d.id == device.id) {
                continue;
            }
            resolved.push((role, device));
        }

        let mut inputs = resolved
            .into_iter()
            .enumerate()
            .map(|(offset, (role, device))| AudioInput {
                device,
                role,
                input_index: first_input_index + offset,
            });

        match (inputs.next(), inputs.next()) {
            (Some(input), None) => AudioRoute::Single { input },
            (Some(a), Some(b)) if separate_tracks => AudioRoute::Separate { inputs: [a, b] },
            (Some(a), Some(b)) => AudioRoute::Mixed { inputs: [a, b] },
            _ => AudioRoute::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AudioRoute::None)
    }

    pub fn inputs(&self) -> Vec<&AudioInput> {
        match self {
            AudioRoute::None => Vec::new(),
            AudioRoute::Single { input } => vec![input],
            AudioRoute::Mixed { inputs } | AudioRoute::Separate { inputs } => inputs.iter().collect(),
        }
    }

    /// Number of audio streams in the output file
    pub fn output_streams(&self) -> usize {
        match self {
            AudioRoute::None => 0,
            AudioRoute::Single { .. } | AudioRoute::Mixed { .. } => 1,
            AudioRoute::Separate { .. } => 2,
        }
    }

    /// `-f <backend> -i <device>` for every input, in index order
    pub fn input_args(&self, platform: Platform) -> Vec<String> {
        self.inputs()
            .into_iter()
            .flat_map(|input| audio_input_args(platform, &input.device.id))
            .collect()
    }

    /// Mixing stage for a `-filter_complex` graph, if this route mixes
    pub fn mix_graph(&self, enhance: bool) -> Option<String> {
        let AudioRoute::Mixed { inputs: [a, b] } = self else {
            return None;
        };

        let mut graph = format!(
            "[{}:a][{}:a]amix=inputs=2:duration=longest:normalize=1",
            a.input_index, b.input_index
        );
        if enhance {
            graph.push(',');
            graph.push_str(ENHANCEMENT_CHAIN);
        }
        graph.push_str(MIXED_LABEL);
        Some(graph)
    }

    /// `-map` entries for the audio output streams
    pub fn map_args(&self) -> Vec<String> {
        match self {
            AudioRoute::None => Vec::new(),
            AudioRoute::Mixed { .. } => vec!["-map".into(), MIXED_LABEL.into()],
            _ => self
                .inputs()
                .into_iter()
                .flat_map(|input| ["-map".to_string(), format!("{}:a", input.input_index)])
                .collect(),
        }
    }

    /// Codec and per-stream filter options
    pub fn codec_args(&self, enhance: bool) -> Vec<String> {
        if self.is_none() {
            return Vec::new();
        }

        let mut args: Vec<String> = vec![
            "-c:a".into(),
            "aac".into(),
            "-ar".into(),
            "48000".into(),
            "-ac".into(),
            "2".into(),
            "-b:a".into(),
            if enhance { "256k" } else { "128k" }.into(),
        ];

        // The mixed route already carries the chain inside its graph
        if enhance && !matches!(self, AudioRoute::Mixed { .. }) {
            args.extend(["-af".to_string(), ENHANCEMENT_CHAIN.to_string()]);
        }

        args
    }
}
