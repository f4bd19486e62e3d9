//! End-to-end session tests against a fake encoder script

#![cfg(unix)]

use serde_json::json;
use session_recorder::capture::{Platform, StaticDevices, StaticSources, WindowBounds, WindowInfo};
use session_recorder::config::{RecorderConfig, Timings};
use session_recorder::recorder::{
    RecorderEvent, RecordingOptions, SegmentStatus, SessionManager, SessionState, SourceKind,
};
use session_recorder::settings::{MemorySettings, SettingsStore, RECORDING_DEFAULTS_KEY};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// What the fake encoder does with a capture request
#[derive(Clone, Copy)]
enum Encoder {
    /// Writes its output name into the file, then waits for `q`
    Writes,
    /// Leaves a zero-byte file
    Empty,
    /// Writes a little, then dies
    Crashes,
    /// Writes the first segment, leaves later ones empty
    EmptyAfterFirst,
}

const SCRIPT_HEAD: &str = r#"#!/bin/sh
for last; do :; done
case " $* " in
  *" -encoders "*) exit 0 ;;
esac
printf '%s\n' "$*" >> "$0.args"
list=""
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then list="$arg"; fi
  prev="$arg"
done
case " $* " in
  *" concat "*)
    sed -n "s/^file '\(.*\)'$/\1/p" "$list" | while IFS= read -r f; do cat "$f"; done > "$last"
    exit 0 ;;
esac
"#;

const SCRIPT_TAIL: &str = r#"printf 'frame=12\nfps=30.0\nout_time=00:00:00.400000\nprogress=continue\n'
read x
exit 0
"#;

fn write_fake_ffmpeg(dir: &Path, encoder: Encoder) -> PathBuf {
    let capture = match encoder {
        Encoder::Writes => "printf '%s;' \"$(basename \"$last\")\" > \"$last\"\n",
        Encoder::Empty => ": > \"$last\"\n",
        Encoder::Crashes => {
            "printf data > \"$last\"\nsleep 0.2\necho 'Error opening input device' >&2\nexit 1\n"
        }
        Encoder::EmptyAfterFirst => {
            "case \"$last\" in\n  *-segment-0.mp4) printf data > \"$last\" ;;\n  *) : > \"$last\" ;;\nesac\n"
        }
    };
    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, format!("{SCRIPT_HEAD}{capture}{SCRIPT_TAIL}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Harness {
    dir: TempDir,
    manager: SessionManager,
    settings: Arc<MemorySettings>,
    events: broadcast::Receiver<RecorderEvent>,
}

impl Harness {
    fn new(encoder: Encoder) -> Self {
        Self::with(encoder, StaticSources::default(), StaticDevices::default())
    }

    fn with(encoder: Encoder, sources: StaticSources, devices: StaticDevices) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            ffmpeg_path: write_fake_ffmpeg(dir.path(), encoder),
            platform: Platform::Linux,
            default_output_dir: dir.path().join("out"),
            timings: Timings {
                countdown_tick_ms: 20,
                timer_interval_ms: 20,
                graceful_stop_timeout_ms: 1000,
                terminate_timeout_ms: 500,
                settle_delay_ms: 10,
            },
            ..RecorderConfig::default()
        };
        let settings = Arc::new(MemorySettings::new());
        let manager = SessionManager::with_collaborators(
            config,
            Arc::new(sources),
            Arc::new(devices),
            settings.clone(),
        );
        let events = manager.subscribe();
        Self {
            dir,
            manager,
            settings,
            events,
        }
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn out_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.out_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Argument lines of every encoder run so far
    fn encoder_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("fake-ffmpeg.args"))
            .map(|text| text.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Arguments of the run that wrote `segment`
    fn segment_args(&self, segment: &Path) -> String {
        let name = segment.file_name().unwrap().to_string_lossy().into_owned();
        self.encoder_calls()
            .into_iter()
            .find(|line| !line.contains(" concat ") && line.ends_with(&name))
            .unwrap_or_else(|| panic!("no encoder run wrote {name}"))
    }

    /// Wait for the first event matching `wanted`
    async fn wait_for<F>(&mut self, wanted: F) -> RecorderEvent
    where
        F: Fn(&RecorderEvent) -> bool,
    {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(event) if wanted(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("event did not arrive")
    }

    /// Everything already queued
    fn drain(&mut self) -> Vec<RecorderEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_countdown_ticks_before_start() {
    let mut h = Harness::new(Encoder::Writes);
    let options = RecordingOptions {
        countdown: 3,
        ..RecordingOptions::default()
    };
    h.manager.start(options).await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Recording);

    let sequence: Vec<String> = h
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            RecorderEvent::Countdown { remaining } => Some(remaining.to_string()),
            RecorderEvent::Started { .. } => Some("started".to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(sequence, ["3", "2", "1", "0", "started"]);

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_during_countdown_cancels_session() {
    let mut h = Harness::new(Encoder::Writes);
    let manager = h.manager.clone();
    let options = RecordingOptions {
        countdown: 10,
        ..RecordingOptions::default()
    };
    let start = tokio::spawn(async move { manager.start(options).await });

    h.wait_for(|e| matches!(e, RecorderEvent::Countdown { remaining: 9 })).await;
    assert_eq!(h.manager.state(), SessionState::CountingDown);
    assert_eq!(h.manager.stop().await.unwrap_err().code(), "INVALID_STATE");

    let started = start.await.unwrap();
    assert_eq!(started.unwrap_err().code(), "INVALID_STATE");
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert!(h.out_files().is_empty());
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = Harness::new(Encoder::Writes);
    h.manager.start(RecordingOptions::default()).await.unwrap();

    let err = h.manager.start(RecordingOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "RESOURCE_UNAVAILABLE");
    assert_eq!(h.manager.state(), SessionState::Recording);

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_single_segment_finalize_moves_file() {
    let mut h = Harness::new(Encoder::Writes);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    assert!(started.segment_path.to_string_lossy().ends_with("-segment-0.mp4"));
    settle().await;

    let stopped = h.manager.stop().await.unwrap();
    assert_eq!(stopped.segments, 1);
    assert_eq!(h.manager.state(), SessionState::Stopped);
    assert!(started.segment_path.exists());

    let finalized = h.manager.finalize().await.unwrap();
    assert_eq!(finalized.path, started.path);
    assert!(finalized.size > 0);
    assert!(!started.segment_path.exists());
    assert_eq!(h.manager.state(), SessionState::Idle);

    h.wait_for(|e| matches!(e, RecorderEvent::Completed { .. })).await;
    let name = started.path.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(h.out_files(), [name]);
}

#[tokio::test]
async fn test_pause_resume_concatenates_segments() {
    let mut h = Harness::new(Encoder::Writes);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;

    h.manager.pause().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Paused);
    assert_eq!(h.manager.pause().await.unwrap_err().code(), "INVALID_STATE");

    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.segments.len(), 1);
    assert_eq!(snapshot.segments[0].status, SegmentStatus::Closed);
    assert!(snapshot.segments[0].duration_ms > 0);
    let paused_at = h.manager.duration_ms();

    let resumed = h.manager.resume(None).await.unwrap();
    assert!(resumed.segment_path.to_string_lossy().ends_with("-segment-1.mp4"));
    assert_eq!(resumed.path, started.path);
    h.wait_for(|e| matches!(e, RecorderEvent::Resumed { segment_index: 1, .. })).await;
    settle().await;

    let stopped = h.manager.stop().await.unwrap();
    assert_eq!(stopped.segments, 2);
    assert!(stopped.duration_ms > paused_at);

    let finalized = h.manager.finalize().await.unwrap();
    assert_eq!(finalized.segments, 2);
    let expected = format!(
        "{};{};",
        started.segment_path.file_name().unwrap().to_string_lossy(),
        resumed.segment_path.file_name().unwrap().to_string_lossy()
    );
    assert_eq!(std::fs::read_to_string(&finalized.path).unwrap(), expected);
    assert!(started.segment_path.exists());
    assert!(resumed.segment_path.exists());
}

#[tokio::test]
async fn test_stop_from_paused() {
    let h = Harness::new(Encoder::Writes);
    h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;
    h.manager.pause().await.unwrap();

    let stopped = h.manager.stop().await.unwrap();
    assert_eq!(stopped.segments, 1);
    assert_eq!(h.manager.resume(None).await.unwrap_err().code(), "INVALID_STATE");
}

#[tokio::test]
async fn test_empty_output_is_reported_and_deleted() {
    let mut h = Harness::new(Encoder::Empty);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;

    let err = h.manager.stop().await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_OUTPUT_ERROR");
    assert_eq!(h.manager.state(), SessionState::Failed);
    assert!(!started.segment_path.exists());

    match h.wait_for(|e| matches!(e, RecorderEvent::Stopped { .. })).await {
        RecorderEvent::Stopped { success, error, .. } => {
            assert!(!success);
            assert!(error.is_some());
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(h.manager.finalize().await.unwrap_err().code(), "INVALID_STATE");
    h.manager.discard().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_encoder_crash_fails_session() {
    let mut h = Harness::new(Encoder::Crashes);
    h.manager.start(RecordingOptions::default()).await.unwrap();

    match h.wait_for(|e| matches!(e, RecorderEvent::Error { .. })).await {
        RecorderEvent::Error { message, code } => {
            assert!(message.contains("Error opening input device"), "{message}");
            assert_eq!(code, "ENCODER_PROCESS_ERROR");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.manager.state(), SessionState::Failed);

    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.segments[0].status, SegmentStatus::Crashed);
    assert!(snapshot.last_error.is_some());

    // A failed session does not block the next one
    assert_eq!(h.manager.stop().await.unwrap_err().code(), "INVALID_STATE");
    h.manager.start(RecordingOptions::default()).await.unwrap();
}

#[tokio::test]
async fn test_finalize_fails_when_segment_vanishes() {
    let mut h = Harness::new(Encoder::Writes);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;
    h.manager.stop().await.unwrap();

    std::fs::remove_file(&started.segment_path).unwrap();
    let err = h.manager.finalize().await.unwrap_err();
    assert_eq!(err.code(), "FINALIZE_ERROR");
    assert_eq!(h.manager.state(), SessionState::Failed);
    assert!(!started.path.exists());
    h.wait_for(|e| matches!(e, RecorderEvent::Error { .. })).await;
}

#[tokio::test]
async fn test_timer_events_while_recording() {
    let mut h = Harness::new(Encoder::Writes);
    h.manager.start(RecordingOptions::default()).await.unwrap();

    match h.wait_for(|e| matches!(e, RecorderEvent::Timer { .. })).await {
        RecorderEvent::Timer { elapsed_ms } => assert!(elapsed_ms > 0),
        other => panic!("unexpected event {:?}", other),
    }
    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_with_stored_defaults() {
    let h = Harness::new(Encoder::Writes);
    h.settings
        .set(
            RECORDING_DEFAULTS_KEY,
            json!({ "frameRate": 15, "timestamp": true }),
        )
        .unwrap();

    h.manager
        .start_with_defaults(json!({ "frameRate": 24 }))
        .await
        .unwrap();

    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.options.frame_rate, 24);
    assert!(snapshot.options.timestamp);
    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_unwritable_output_dir_is_rejected() {
    let h = Harness::new(Encoder::Writes);
    let blocker = h.dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let options = RecordingOptions {
        output_dir: Some(blocker),
        ..RecordingOptions::default()
    };
    let err = h.manager.start(options).await.unwrap_err();
    assert_eq!(err.code(), "DIRECTORY_ACCESS_ERROR");
    assert_eq!(h.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_crash_before_pause_fails_session() {
    let mut h = Harness::new(Encoder::Crashes);
    h.manager.start(RecordingOptions::default()).await.unwrap();
    // Keep the runtime busy so the exit is only seen by pause
    std::thread::sleep(Duration::from_millis(500));

    let err = h.manager.pause().await.unwrap_err();
    assert_eq!(err.code(), "ENCODER_PROCESS_ERROR");
    assert!(err.to_string().contains("Error opening input device"), "{err}");
    assert_eq!(h.manager.state(), SessionState::Failed);

    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.segments[0].status, SegmentStatus::Crashed);
    assert!(snapshot.last_error.is_some());

    h.wait_for(|e| matches!(e, RecorderEvent::Error { code, .. } if code == "ENCODER_PROCESS_ERROR"))
        .await;
    assert!(!h.drain().iter().any(|e| matches!(e, RecorderEvent::Paused { .. })));
}

#[tokio::test]
async fn test_crash_before_stop_fails_session() {
    let mut h = Harness::new(Encoder::Crashes);
    h.manager.start(RecordingOptions::default()).await.unwrap();
    std::thread::sleep(Duration::from_millis(500));

    let err = h.manager.stop().await.unwrap_err();
    assert_eq!(err.code(), "ENCODER_PROCESS_ERROR");
    assert_eq!(h.manager.state(), SessionState::Failed);
    assert_eq!(h.manager.finalize().await.unwrap_err().code(), "INVALID_STATE");

    h.wait_for(|e| matches!(e, RecorderEvent::Error { .. })).await;
    assert!(!h
        .drain()
        .iter()
        .any(|e| matches!(e, RecorderEvent::Stopped { success: true, .. })));
}

#[tokio::test]
async fn test_empty_pause_segment_is_reported() {
    let mut h = Harness::new(Encoder::Empty);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;

    h.manager.pause().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Paused);
    assert!(!started.segment_path.exists());

    match h.wait_for(|e| matches!(e, RecorderEvent::Error { .. })).await {
        RecorderEvent::Error { message, code } => {
            assert_eq!(code, "EMPTY_OUTPUT_ERROR");
            assert!(message.contains("-segment-0.mp4"), "{message}");
        }
        other => panic!("unexpected event {:?}", other),
    }
    h.wait_for(|e| matches!(e, RecorderEvent::Paused { .. })).await;
}

#[tokio::test]
async fn test_empty_last_segment_fails_stop_but_keeps_earlier_data() {
    let mut h = Harness::new(Encoder::EmptyAfterFirst);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();
    settle().await;
    h.manager.pause().await.unwrap();

    let resumed = h.manager.resume(None).await.unwrap();
    settle().await;

    let err = h.manager.stop().await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_OUTPUT_ERROR");
    assert_eq!(h.manager.state(), SessionState::Stopped);
    assert!(!resumed.segment_path.exists());

    match h.wait_for(|e| matches!(e, RecorderEvent::Stopped { .. })).await {
        RecorderEvent::Stopped { success, error, .. } => {
            assert!(!success);
            assert!(error.unwrap().contains("segment 1"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    let finalized = h.manager.finalize().await.unwrap();
    assert_eq!(finalized.segments, 1);
    assert_eq!(finalized.path, started.path);
    assert_eq!(std::fs::read(&finalized.path).unwrap(), b"data");
}

#[tokio::test]
async fn test_immediate_pause_then_resume_opens_second_segment() {
    let mut h = Harness::new(Encoder::Writes);
    let started = h.manager.start(RecordingOptions::default()).await.unwrap();

    h.manager.pause().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Paused);
    h.wait_for(|e| matches!(e, RecorderEvent::Paused { segment_index: 0, .. })).await;

    let resumed = h.manager.resume(None).await.unwrap();
    assert!(resumed.segment_path.to_string_lossy().ends_with("-segment-1.mp4"));
    assert_eq!(resumed.path, started.path);
    h.wait_for(|e| matches!(e, RecorderEvent::Resumed { segment_index: 1, .. })).await;
    assert_eq!(h.manager.state(), SessionState::Recording);

    settle().await;
    let stopped = h.manager.stop().await.unwrap();
    assert_eq!(stopped.segments, 2);
}

#[tokio::test]
async fn test_window_capture_crops_after_countdown() {
    let window = WindowInfo {
        id: "W1".to_string(),
        title: "Editor".to_string(),
        app_name: "editor".to_string(),
        bounds: WindowBounds {
            x: 100,
            y: 50,
            width: 800,
            height: 600,
        },
    };
    let mut h = Harness::with(
        Encoder::Writes,
        StaticSources::default().with_windows(vec![window]),
        StaticDevices::default(),
    );

    let options = RecordingOptions {
        source: SourceKind::Window,
        window_id: Some("W1".to_string()),
        countdown: 3,
        ..RecordingOptions::default()
    };
    let started = h.manager.start(options).await.unwrap();
    let countdown: Vec<u32> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            RecorderEvent::Countdown { remaining } => Some(remaining),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, [3, 2, 1, 0]);

    let args = h.segment_args(&started.segment_path);
    assert!(args.contains("x11grab"), "{args}");
    assert!(args.contains("crop=800:600:100:50"), "{args}");

    settle().await;
    h.manager.stop().await.unwrap();
    let finalized = h.manager.finalize().await.unwrap();
    assert_eq!(finalized.path, started.path);
    assert!(finalized.path.exists());
}

fn two_device_options(separate_audio_tracks: bool) -> RecordingOptions {
    RecordingOptions {
        system_audio_device: Some("Stereo Mix".to_string()),
        microphone_device: Some("Microphone".to_string()),
        separate_audio_tracks,
        ..RecordingOptions::default()
    }
}

#[tokio::test]
async fn test_two_audio_devices_are_mixed_into_one_track() {
    let h = Harness::with(
        Encoder::Writes,
        StaticSources::default(),
        StaticDevices::audio_named(&["Stereo Mix", "Microphone"]),
    );
    let started = h.manager.start(two_device_options(false)).await.unwrap();

    let args = h.segment_args(&started.segment_path);
    assert!(args.contains("-f pulse -i Stereo Mix -f pulse -i Microphone"), "{args}");
    assert!(args.contains("[1:a][2:a]amix=inputs=2"), "{args}");
    assert!(args.contains("-map [aout]"), "{args}");
    assert!(!args.contains("-map 1:a"), "{args}");

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_two_audio_devices_as_separate_tracks() {
    let h = Harness::with(
        Encoder::Writes,
        StaticSources::default(),
        StaticDevices::audio_named(&["Stereo Mix", "Microphone"]),
    );
    let started = h.manager.start(two_device_options(true)).await.unwrap();

    let args = h.segment_args(&started.segment_path);
    assert!(args.contains("-map 0:v -map 1:a -map 2:a"), "{args}");
    assert!(!args.contains("amix"), "{args}");

    h.manager.stop().await.unwrap();
}
