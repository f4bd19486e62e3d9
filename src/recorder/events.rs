//! Events pushed to observers while a session runs

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Recorder events, serialised as `{"type": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecorderEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        path: String,
        segment_path: String,
        start_time: DateTime<Utc>,
    },
    Countdown { remaining: u32 },
    #[serde(rename_all = "camelCase")]
    Timer { elapsed_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Progress {
        segment_index: usize,
        percent: Option<f64>,
        timemark: Option<String>,
        fps: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Paused {
        segment_index: usize,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Resumed {
        segment_index: usize,
        segment_path: String,
    },
    Error {
        message: String,
        code: String,
    },
    #[serde(rename_all = "camelCase")]
    Stopped {
        path: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        path: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },
}

impl RecorderEvent {
    /// Event name, matching the serialised `type`
    pub fn name(&self) -> &'static str {
        match self {
            RecorderEvent::Started { .. } => "started",
            RecorderEvent::Countdown { .. } => "countdown",
            RecorderEvent::Timer { .. } => "timer",
            RecorderEvent::Progress { .. } => "progress",
            RecorderEvent::Paused { .. } => "paused",
            RecorderEvent::Resumed { .. } => "resumed",
            RecorderEvent::Error { .. } => "error",
            RecorderEvent::Stopped { .. } => "stopped",
            RecorderEvent::Completed { .. } => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_shape() {
        let event = RecorderEvent::Stopped {
            path: "/rec/out.mp4".to_string(),
            duration_ms: 5000,
            success: true,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "stopped", "path": "/rec/out.mp4", "duration": 5000, "success": true })
        );
        assert_eq!(event.name(), "stopped");
    }

    #[test]
    fn test_countdown_shape() {
        let value = serde_json::to_value(RecorderEvent::Countdown { remaining: 3 }).unwrap();
        assert_eq!(value, json!({ "type": "countdown", "remaining": 3 }));
    }
}
