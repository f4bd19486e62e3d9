//! Recording request handlers

use super::CommandResponse;
use crate::recorder::{Preset, RecordingOptions, SessionManager, SessionSnapshot, SessionState};
use crate::settings::{merge_json, RECORDING_DEFAULTS_KEY};
use crate::utils::fs::recording_info;
use crate::utils::{RecorderError, RecorderResult};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Parse request options. An optional `"preset"` name is applied first and
/// the remaining fields override it.
pub fn options_from_request(request: Value) -> RecorderResult<RecordingOptions> {
    let mut request = match request {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    let preset = match request.as_object_mut().and_then(|o| o.remove("preset")) {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(
            Preset::from_name(&name)
                .ok_or_else(|| RecorderError::Validation(format!("Unknown preset {name:?}")))?,
        ),
        Some(other) => {
            return Err(RecorderError::Validation(format!(
                "Preset must be a name, got {other}"
            )))
        }
    };

    match preset {
        None => RecordingOptions::from_json(request),
        Some(preset) => {
            let mut base = RecordingOptions::default();
            preset.apply(&mut base);
            let mut merged = serde_json::to_value(&base)?;
            merge_json(&mut merged, request);
            RecordingOptions::from_json(merged)
        }
    }
}

/// Start recording with the given options
pub async fn start_recording(manager: &SessionManager, options: Value) -> CommandResponse {
    let result = match options_from_request(options) {
        Ok(options) => manager.start(options).await,
        Err(e) => Err(e),
    };
    CommandResponse::from_result(result)
}

/// Start recording with stored defaults under `overrides`
pub async fn start_recording_with_defaults(
    manager: &SessionManager,
    overrides: Value,
) -> CommandResponse {
    CommandResponse::from_result(manager.start_with_defaults(overrides).await)
}

/// Pause recording
pub async fn pause_recording(manager: &SessionManager) -> CommandResponse {
    CommandResponse::from_result(manager.pause().await.map(|_| json!({ "durationMs": manager.duration_ms() })))
}

/// Resume recording, optionally with changed options
pub async fn resume_recording(manager: &SessionManager, options: Option<Value>) -> CommandResponse {
    let options = match options.filter(|o| !o.is_null()).map(options_from_request).transpose() {
        Ok(options) => options,
        Err(e) => return CommandResponse::failure(&e),
    };
    CommandResponse::from_result(manager.resume(options).await)
}

/// Stop recording
pub async fn stop_recording(manager: &SessionManager) -> CommandResponse {
    CommandResponse::from_result(manager.stop().await)
}

/// Join the stopped recording's segments into the final file
pub async fn finalize_recording(manager: &SessionManager) -> CommandResponse {
    CommandResponse::from_result(manager.finalize().await)
}

/// Drop a stopped or failed session
pub async fn discard_recording(manager: &SessionManager) -> CommandResponse {
    CommandResponse::from_result(manager.discard().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingStatus {
    state: SessionState,
    duration_ms: u64,
    session: Option<SessionSnapshot>,
}

/// Get current recording state
pub async fn get_recording_state(manager: &SessionManager) -> CommandResponse {
    let session = manager.snapshot().await;
    CommandResponse::ok(RecordingStatus {
        state: manager.state(),
        duration_ms: manager.duration_ms(),
        session,
    })
}

/// Get current recording duration in milliseconds
pub fn get_recording_duration(manager: &SessionManager) -> CommandResponse {
    CommandResponse::ok(json!({ "durationMs": manager.duration_ms() }))
}

/// Get list of available audio input devices
pub async fn get_audio_devices(manager: &SessionManager) -> CommandResponse {
    CommandResponse::ok(json!({ "devices": manager.audio_devices().await }))
}

/// Get list of available cameras/webcams
pub async fn get_cameras(manager: &SessionManager) -> CommandResponse {
    CommandResponse::ok(json!({ "devices": manager.video_devices().await }))
}

/// Get list of available displays
pub fn get_displays(manager: &SessionManager) -> CommandResponse {
    CommandResponse::ok(json!({ "displays": manager.displays() }))
}

pub fn get_windows(manager: &SessionManager) -> CommandResponse {
    CommandResponse::ok(json!({ "windows": manager.windows() }))
}

/// Preset names with the options each one produces
pub fn get_presets() -> CommandResponse {
    let presets: Vec<Value> = Preset::ALL
        .iter()
        .map(|preset| {
            let mut options = RecordingOptions::default();
            preset.apply(&mut options);
            json!({ "name": preset.name(), "options": options })
        })
        .collect();
    CommandResponse::ok(json!({ "presets": presets }))
}

/// Store partial options used by [`start_recording_with_defaults`]
pub fn save_recording_defaults(manager: &SessionManager, defaults: Value) -> CommandResponse {
    if !defaults.is_object() {
        return CommandResponse::failure(&RecorderError::Validation(
            "Recording defaults must be an object".to_string(),
        ));
    }
    // Reject defaults that could never start a session
    if let Err(e) = RecordingOptions::from_json(defaults.clone()) {
        return CommandResponse::failure(&e);
    }
    CommandResponse::from_result(manager.settings().set(RECORDING_DEFAULTS_KEY, defaults))
}

/// Size and modification time of a recorded file
pub fn get_recording_info(path: &Path) -> CommandResponse {
    CommandResponse::from_result(recording_info(path))
}
