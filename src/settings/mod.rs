//! Settings store
//!
//! Simple key/value persistence for user preferences such as the default
//! recording options. No transactions; the last `set` wins.

use crate::recorder::options::RecordingOptions;
use crate::utils::{RecorderError, RecorderResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Key holding partial [`RecordingOptions`] JSON
pub const RECORDING_DEFAULTS_KEY: &str = "recordingDefaults";

/// Key/value settings collaborator
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> RecorderResult<()>;
}

/// Settings held in memory only
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<Map<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> RecorderResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings persisted as one JSON object on disk
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonFileSettings {
    /// Open the store at `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> RecorderResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                other => {
                    return Err(RecorderError::Settings(format!(
                        "Settings file {:?} must hold a JSON object, found {}",
                        path,
                        type_name(&other)
                    )))
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write through a temp file in the same directory, then rename over
    fn persist(&self, values: &Map<String, Value>) -> RecorderResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(".settings")
            .tempfile_in(dir)?;
        serde_json::to_writer_pretty(&mut file, values)?;
        file.flush()?;
        file.persist(&self.path)
            .map_err(|e| RecorderError::Settings(format!("Failed to save settings: {}", e)))?;

        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> RecorderResult<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Recursively lay `overlay` on top of `base`. Objects merge key by key,
/// anything else in `overlay` replaces the base value.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Stored defaults with `overrides` on top, as typed options
pub fn recording_options_with_defaults(
    store: &dyn SettingsStore,
    overrides: Value,
) -> RecorderResult<RecordingOptions> {
    let mut merged = store
        .get(RECORDING_DEFAULTS_KEY)
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Map::new()));

    if !overrides.is_null() {
        merge_json(&mut merged, overrides);
    }

    RecordingOptions::from_json(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::types::QualityTier;
    use serde_json::json;

    #[test]
    fn test_merge_json_nested() {
        let mut base = json!({ "quality": "low", "webcam": { "enabled": true, "scale": 0.3 } });
        merge_json(&mut base, json!({ "webcam": { "scale": 0.5 }, "frameRate": 60 }));
        assert_eq!(
            base,
            json!({ "quality": "low", "frameRate": 60, "webcam": { "enabled": true, "scale": 0.5 } })
        );
    }

    #[test]
    fn test_defaults_under_overrides() {
        let store = MemorySettings::new();
        store
            .set(RECORDING_DEFAULTS_KEY, json!({ "quality": "ultra", "frameRate": 24 }))
            .unwrap();

        let options = recording_options_with_defaults(&store, json!({ "frameRate": 60 })).unwrap();
        assert_eq!(options.quality, QualityTier::Ultra);
        assert_eq!(options.frame_rate, 60);
        // Untouched fields keep built-in defaults
        assert!(options.show_cursor);
    }

    #[test]
    fn test_no_defaults_stored() {
        let store = MemorySettings::new();
        let options = recording_options_with_defaults(&store, Value::Null).unwrap();
        assert_eq!(options, RecordingOptions::default());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = JsonFileSettings::open(&path).unwrap();
        store.set(RECORDING_DEFAULTS_KEY, json!({ "quality": "medium" })).unwrap();

        let reopened = JsonFileSettings::open(&path).unwrap();
        assert_eq!(
            reopened.get(RECORDING_DEFAULTS_KEY),
            Some(json!({ "quality": "medium" }))
        );
        // Only the settings file remains, no temp leftovers
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_json_file_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = JsonFileSettings::open(&path).unwrap_err();
        assert_eq!(err.code(), "SETTINGS_ERROR");
    }
}
