//! Recording coordinator
//!
//! [`SessionManager`] owns the single recording session of the process and
//! drives it through countdown, segments, pause/resume, stop and finalize.
//! Requests are serialised on one async mutex; the encoder process runs
//! concurrently and reports back through its segment watcher.

use super::events::RecorderEvent;
use super::finalize::Finalizer;
use super::options::RecordingOptions;
use super::segment::{wait_outcome, SegmentHandle, SegmentOutcome, SegmentRecorder};
use super::state::{
    segment_path_for, Segment, SegmentStatus, Session, SessionClock, SessionSnapshot, SessionState,
};
use crate::capture::{
    AudioDeviceInfo, CameraInfo, CaptureDirective, DeviceEnumerator, DisplayInfo,
    FfmpegDeviceEnumerator, SourceProvider, SourceResolver, StaticSources, WindowInfo,
};
use crate::config::RecorderConfig;
use crate::ffmpeg::{capture_args, EncoderPlanner, SegmentInputs};
use crate::settings::{recording_options_with_defaults, JsonFileSettings, MemorySettings, SettingsStore};
use crate::utils::fs::{ensure_writable_dir, unique_output_path};
use crate::utils::{RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Result of a successful start
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    /// Final output path of the session
    pub path: PathBuf,
    pub segment_path: PathBuf,
    pub start_time: DateTime<Utc>,
}

/// Result of a successful stop
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub path: PathBuf,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Segments holding data, ready for finalize
    pub segments: usize,
}

/// Result of a successful finalize
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResult {
    pub path: PathBuf,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub size: u64,
    pub segments: usize,
}

/// How the segment stopped by a pause or stop ended up
struct ClosedSegment {
    index: usize,
    status: SegmentStatus,
    /// Encoder had already died on its own
    failure: Option<String>,
}

/// The live session plus everything needed to open its next segment
struct ActiveSession {
    session: Session,
    capture: Option<CaptureDirective>,
    audio_devices: Vec<AudioDeviceInfo>,
    handle: Option<SegmentHandle>,
    timer: Option<JoinHandle<()>>,
    countdown_cancel: Option<Arc<Notify>>,
}

struct Inner {
    config: RecorderConfig,
    sources: Arc<dyn SourceProvider>,
    devices: Arc<dyn DeviceEnumerator>,
    settings: Arc<dyn SettingsStore>,
    resolver: SourceResolver,
    planner: EncoderPlanner,
    recorder: SegmentRecorder,
    finalizer: Finalizer,
    events: broadcast::Sender<RecorderEvent>,
    active: Mutex<Option<ActiveSession>>,
    /// Mirror of the session state for synchronous reads
    state: RwLock<SessionState>,
    clock: Arc<RwLock<SessionClock>>,
}

/// Manages the recording session; clones share the same session
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Manager with ffmpeg-backed devices, a single default display and the
    /// settings store named by the config
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        let settings: Arc<dyn SettingsStore> = match &config.settings_path {
            Some(path) => Arc::new(JsonFileSettings::open(path)?),
            None => Arc::new(MemorySettings::new()),
        };
        let devices = Arc::new(FfmpegDeviceEnumerator::new(
            config.ffmpeg_path.clone(),
            config.platform,
        ));
        Ok(Self::with_collaborators(
            config,
            Arc::new(StaticSources::default()),
            devices,
            settings,
        ))
    }

    pub fn with_collaborators(
        config: RecorderConfig,
        sources: Arc<dyn SourceProvider>,
        devices: Arc<dyn DeviceEnumerator>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let inner = Inner {
            resolver: SourceResolver::new(config.platform),
            planner: EncoderPlanner::new(config.ffmpeg_path.clone()),
            recorder: SegmentRecorder::new(config.ffmpeg_path.clone(), config.timings, events.clone()),
            finalizer: Finalizer::new(config.ffmpeg_path.clone()),
            config,
            sources,
            devices,
            settings,
            events,
            active: Mutex::new(None),
            state: RwLock::new(SessionState::Idle),
            clock: Arc::new(RwLock::new(SessionClock::default())),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> Arc<dyn SettingsStore> {
        self.inner.settings.clone()
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Captured time in milliseconds across all segments so far
    pub fn duration_ms(&self) -> u64 {
        self.inner.clock.read().elapsed_ms()
    }

    /// Subscribe to recorder events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let guard = self.inner.active.lock().await;
        guard
            .as_ref()
            .map(|active| active.session.snapshot(self.duration_ms()))
    }

    pub async fn audio_devices(&self) -> Vec<AudioDeviceInfo> {
        self.inner.devices.audio_devices().await
    }

    pub async fn video_devices(&self) -> Vec<CameraInfo> {
        self.inner.devices.video_devices().await
    }

    pub fn displays(&self) -> Vec<DisplayInfo> {
        self.inner.sources.displays()
    }

    pub fn windows(&self) -> Vec<WindowInfo> {
        self.inner.sources.windows()
    }

    /// Forget which hardware encoders were found; the next segment checks again
    pub fn refresh_encoders(&self) {
        self.inner.planner.refresh_encoders();
    }

    fn emit(&self, event: RecorderEvent) {
        tracing::debug!("Event: {:?}", event);
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, active: &mut ActiveSession, state: SessionState) {
        tracing::info!(
            "Session {}: {:?} -> {:?}",
            active.session.id,
            active.session.state,
            state
        );
        active.session.state = state;
        *self.inner.state.write() = state;
    }

    fn clear(&self, slot: &mut Option<ActiveSession>) {
        if let Some(mut active) = slot.take() {
            if let Some(timer) = active.timer.take() {
                timer.abort();
            }
        }
        *self.inner.state.write() = SessionState::Idle;
        *self.inner.clock.write() = SessionClock::default();
    }

    /// Start with stored defaults under `overrides`
    pub async fn start_with_defaults(&self, overrides: serde_json::Value) -> RecorderResult<StartResult> {
        let options = recording_options_with_defaults(self.inner.settings.as_ref(), overrides)?;
        self.start(options).await
    }

    /// Start a new session
    pub async fn start(&self, options: RecordingOptions) -> RecorderResult<StartResult> {
        let mut guard = self.inner.active.lock().await;
        if guard.as_ref().is_some_and(|a| a.session.state.is_active()) {
            return Err(RecorderError::ResourceUnavailable(
                "A recording session is already active".to_string(),
            ));
        }

        options.validate()?;
        let capture = self
            .inner
            .resolver
            .resolve(&options, self.inner.sources.as_ref())?;

        let config = &self.inner.config;
        let output_dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| config.default_output_dir.clone());
        ensure_writable_dir(&output_dir)?;

        let audio_devices = if options.has_audio_request() {
            self.inner.devices.audio_devices().await
        } else {
            Vec::new()
        };

        let final_path = unique_output_path(
            &output_dir,
            &config.file_prefix,
            &config.container,
            Utc::now(),
            |candidate| segment_path_for(candidate, 0).exists(),
        );
        tracing::info!("Recording will be saved to {:?}", final_path);

        // A finished session from before is replaced
        self.clear(&mut guard);

        let countdown = options.countdown;
        let session = Session::new(options, output_dir, final_path);
        let id = session.id;
        let active = guard.insert(ActiveSession {
            session,
            capture,
            audio_devices,
            handle: None,
            timer: None,
            countdown_cancel: None,
        });

        if countdown > 0 {
            let cancel = Arc::new(Notify::new());
            active.countdown_cancel = Some(cancel.clone());
            self.set_state(active, SessionState::CountingDown);
            drop(guard);

            let finished = self.run_countdown(countdown, &cancel).await;

            guard = self.inner.active.lock().await;
            let still_ours = guard
                .as_ref()
                .is_some_and(|a| a.session.id == id && a.session.state == SessionState::CountingDown);
            if !finished || !still_ours {
                return Err(RecorderError::InvalidState(
                    "Recording cancelled during countdown".to_string(),
                ));
            }
        }

        self.begin(&mut guard).await
    }

    /// Tick `seconds` down to zero; false when cancelled
    async fn run_countdown(&self, seconds: u32, cancel: &Notify) -> bool {
        let tick = self.inner.config.timings.countdown_tick();
        for remaining in (0..=seconds).rev() {
            self.emit(RecorderEvent::Countdown { remaining });
            if remaining == 0 {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = cancel.notified() => {
                    tracing::info!("Countdown cancelled at {}", remaining);
                    return false;
                }
            }
        }
        true
    }

    /// Spawn segment 0; a failed spawn destroys the session
    async fn begin(&self, slot: &mut Option<ActiveSession>) -> RecorderResult<StartResult> {
        let Some(active) = slot.as_mut() else {
            return Err(RecorderError::InvalidState("No session to start".to_string()));
        };
        active.countdown_cancel = None;

        match self.open_segment(active).await {
            Ok(segment) => {
                let result = StartResult {
                    path: active.session.final_path.clone(),
                    segment_path: segment.path.clone(),
                    start_time: segment.started_at,
                };
                self.emit(RecorderEvent::Started {
                    path: result.path.display().to_string(),
                    segment_path: result.segment_path.display().to_string(),
                    start_time: result.start_time,
                });
                Ok(result)
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.clear(slot);
                Err(e)
            }
        }
    }

    /// Plan and spawn the next segment, then enter `Recording`
    async fn open_segment(&self, active: &mut ActiveSession) -> RecorderResult<Segment> {
        let index = active.session.next_index();
        let path = active.session.segment_path(index);
        let options = &active.session.options;

        let plan = self
            .inner
            .planner
            .plan(
                options,
                active.capture.as_ref(),
                &active.audio_devices,
                &self.inner.config.watermark_text,
            )
            .await;

        let inputs = SegmentInputs {
            platform: self.inner.config.platform,
            capture: active.capture.as_ref(),
            webcam_device: options
                .webcam
                .device_id
                .as_deref()
                .filter(|_| options.webcam.enabled),
        };
        let args = capture_args(&inputs, &plan, &path);
        let handle = self.inner.recorder.start(index, args, &path)?;

        let segment = Segment::new(index, path);
        active.session.segments.push(segment.clone());
        self.watch_segment(&handle, active.session.id);
        active.handle = Some(handle);

        self.inner.clock.write().start();
        active.timer = Some(self.spawn_timer());
        self.set_state(active, SessionState::Recording);

        Ok(segment)
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let events = self.inner.events.clone();
        let clock = self.inner.clock.clone();
        let interval = self.inner.config.timings.timer_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let elapsed_ms = clock.read().elapsed_ms();
                let _ = events.send(RecorderEvent::Timer { elapsed_ms });
            }
        })
    }

    fn watch_segment(&self, handle: &SegmentHandle, session_id: Uuid) {
        let outcome = handle.outcome_receiver();
        let index = handle.index();
        let manager = self.clone();
        tokio::spawn(async move {
            let outcome = wait_outcome(outcome).await;
            manager.on_segment_exit(session_id, index, outcome).await;
        });
    }

    /// Encoder ended without being asked to
    async fn on_segment_exit(&self, session_id: Uuid, index: usize, outcome: SegmentOutcome) {
        if outcome == SegmentOutcome::Cancelled {
            return;
        }

        let mut guard = self.inner.active.lock().await;
        let Some(active) = guard.as_mut() else { return };
        let ours = active.session.id == session_id
            && active
                .handle
                .as_ref()
                .is_some_and(|h| h.index() == index && !h.is_manual_stop());
        if !ours {
            return;
        }

        active.handle = None;
        if let Some(timer) = active.timer.take() {
            timer.abort();
        }
        let elapsed = self.inner.clock.write().stop();
        let crashed = matches!(outcome, SegmentOutcome::Failed(_));
        if let Some(segment) = active.session.active_segment_mut() {
            segment.close(elapsed, crashed);
        }

        let path = active.session.final_path.display().to_string();
        match outcome {
            SegmentOutcome::Failed(message) => {
                self.fail_session(active, message);
            }
            _ => {
                // Encoder finished by itself; keep what it wrote
                let success = active.session.usable_segments().next().is_some();
                let error = (!success).then(|| "Recording produced no data".to_string());
                let state = if success { SessionState::Stopped } else { SessionState::Failed };
                active.session.last_error = error.clone();
                self.set_state(active, state);
                self.emit(RecorderEvent::Stopped {
                    path,
                    duration_ms: self.duration_ms(),
                    success,
                    error,
                });
            }
        }
    }

    /// Encoder crash: the session fails and keeps its segments
    fn fail_session(&self, active: &mut ActiveSession, message: String) -> RecorderError {
        tracing::error!("Recording failed: {}", message);
        active.session.last_error = Some(message.clone());
        self.set_state(active, SessionState::Failed);
        let error = RecorderError::EncoderProcess(message);
        self.emit(RecorderEvent::Error {
            message: error.to_string(),
            code: error.code().to_string(),
        });
        error
    }

    /// Stop the running segment and inspect its file
    async fn close_active_segment(&self, active: &mut ActiveSession) -> Option<ClosedSegment> {
        let mut handle = active.handle.take()?;
        if let Some(timer) = active.timer.take() {
            timer.abort();
        }

        let elapsed = self.inner.clock.write().stop();
        let outcome = handle.stop().await;
        tracing::info!("Segment {} stopped ({:?}) after {}ms", handle.index(), outcome, elapsed);

        tokio::time::sleep(self.inner.config.timings.settle_delay()).await;
        let failure = match outcome {
            SegmentOutcome::Failed(message) => Some(message),
            _ => None,
        };
        let status = active
            .session
            .active_segment_mut()
            .map(|segment| segment.close(elapsed, failure.is_some()))
            .unwrap_or(SegmentStatus::Empty);

        Some(ClosedSegment {
            index: handle.index(),
            status,
            failure,
        })
    }

    /// Pause the running segment
    pub async fn pause(&self) -> RecorderResult<()> {
        let mut guard = self.inner.active.lock().await;
        let active = match guard.as_mut() {
            Some(active) if active.session.state == SessionState::Recording => active,
            Some(active) => {
                return Err(RecorderError::InvalidState(format!(
                    "Cannot pause while {:?}",
                    active.session.state
                )))
            }
            None => {
                return Err(RecorderError::InvalidState(
                    "No recording in progress".to_string(),
                ))
            }
        };

        let mut index = 0;
        if let Some(closed) = self.close_active_segment(active).await {
            if let Some(message) = closed.failure {
                return Err(self.fail_session(active, message));
            }
            if closed.status == SegmentStatus::Empty {
                // Still pausable; the empty file is gone and finalize skips it
                let error = RecorderError::EmptyOutput(
                    active.session.segment_path(closed.index).display().to_string(),
                );
                self.emit(RecorderEvent::Error {
                    message: error.to_string(),
                    code: error.code().to_string(),
                });
            }
            index = closed.index;
        }

        self.set_state(active, SessionState::Paused);
        self.emit(RecorderEvent::Paused {
            segment_index: index,
            duration_ms: self.duration_ms(),
        });
        Ok(())
    }

    /// Resume into a new segment, optionally with changed options
    pub async fn resume(&self, options: Option<RecordingOptions>) -> RecorderResult<StartResult> {
        let mut guard = self.inner.active.lock().await;
        let active = match guard.as_mut() {
            Some(active) if active.session.state == SessionState::Paused => active,
            _ => {
                return Err(RecorderError::InvalidState(
                    "Recording is not paused".to_string(),
                ))
            }
        };

        if let Some(mut options) = options {
            options.validate()?;
            // Segments of one session always share a directory
            options.output_dir = Some(active.session.output_dir.clone());
            let capture = self
                .inner
                .resolver
                .resolve(&options, self.inner.sources.as_ref())?;
            active.audio_devices = if options.has_audio_request() {
                self.inner.devices.audio_devices().await
            } else {
                Vec::new()
            };
            active.capture = capture;
            active.session.options = options;
        }

        let segment = self.open_segment(active).await?;
        self.emit(RecorderEvent::Resumed {
            segment_index: segment.index,
            segment_path: segment.path.display().to_string(),
        });

        Ok(StartResult {
            path: active.session.final_path.clone(),
            segment_path: segment.path,
            start_time: segment.started_at,
        })
    }

    /// Stop capturing; segments stay on disk for [`SessionManager::finalize`]
    pub async fn stop(&self) -> RecorderResult<StopResult> {
        let mut guard = self.inner.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return Err(RecorderError::InvalidState(
                "Nothing to stop: no recording in progress".to_string(),
            ));
        };

        let mut empty_segment = None;
        match active.session.state {
            SessionState::CountingDown => {
                if let Some(cancel) = active.countdown_cancel.take() {
                    cancel.notify_one();
                }
                let path = active.session.final_path.display().to_string();
                self.clear(&mut guard);
                self.emit(RecorderEvent::Stopped {
                    path,
                    duration_ms: 0,
                    success: false,
                    error: Some("Cancelled during countdown".to_string()),
                });
                return Err(RecorderError::InvalidState(
                    "Recording cancelled before it started".to_string(),
                ));
            }
            SessionState::Recording => {
                if let Some(closed) = self.close_active_segment(active).await {
                    if let Some(message) = closed.failure {
                        return Err(self.fail_session(active, message));
                    }
                    if closed.status == SegmentStatus::Empty {
                        empty_segment = Some(closed.index);
                    }
                }
            }
            SessionState::Paused => {}
            other => {
                return Err(RecorderError::InvalidState(format!(
                    "Nothing to stop: session is {:?}",
                    other
                )))
            }
        }

        let duration_ms = self.duration_ms();
        let path = active.session.final_path.clone();
        let segments = active.session.usable_segments().count();

        if segments == 0 {
            let message = "Recording produced no data; empty output deleted".to_string();
            active.session.last_error = Some(message.clone());
            self.set_state(active, SessionState::Failed);
            self.emit(RecorderEvent::Stopped {
                path: path.display().to_string(),
                duration_ms,
                success: false,
                error: Some(message),
            });
            return Err(RecorderError::EmptyOutput(path.display().to_string()));
        }

        self.set_state(active, SessionState::Stopped);

        // Earlier segments still finalize; the caller hears about the lost tail
        if let Some(index) = empty_segment {
            let segment_path = active.session.segment_path(index);
            let message = format!(
                "Last segment {} was empty and deleted; {} earlier segment(s) kept",
                index, segments
            );
            active.session.last_error = Some(message.clone());
            self.emit(RecorderEvent::Stopped {
                path: path.display().to_string(),
                duration_ms,
                success: false,
                error: Some(message),
            });
            return Err(RecorderError::EmptyOutput(segment_path.display().to_string()));
        }

        self.emit(RecorderEvent::Stopped {
            path: path.display().to_string(),
            duration_ms,
            success: true,
            error: None,
        });
        tracing::info!("Recording stopped. Duration: {}ms", duration_ms);

        Ok(StopResult {
            path,
            duration_ms,
            segments,
        })
    }

    /// Join the stopped session's segments into its final file
    pub async fn finalize(&self) -> RecorderResult<FinalizeResult> {
        let mut guard = self.inner.active.lock().await;
        let active = match guard.as_mut() {
            Some(active) if active.session.state == SessionState::Stopped => active,
            _ => {
                return Err(RecorderError::InvalidState(
                    "No stopped recording to finalize".to_string(),
                ))
            }
        };

        self.set_state(active, SessionState::Finalizing);
        let duration_ms = self.duration_ms();

        let result = self
            .inner
            .finalizer
            .finalize(&active.session.segments, &active.session.final_path)
            .await;

        match result {
            Ok(report) => {
                self.set_state(active, SessionState::Completed);
                self.emit(RecorderEvent::Completed {
                    path: report.path.display().to_string(),
                    duration_ms,
                });
                self.clear(&mut guard);
                Ok(FinalizeResult {
                    path: report.path,
                    duration_ms,
                    size: report.size,
                    segments: report.segments_used,
                })
            }
            Err(e) => {
                tracing::error!("Finalize failed, segments kept: {}", e);
                active.session.last_error = Some(e.to_string());
                self.set_state(active, SessionState::Failed);
                self.emit(RecorderEvent::Error {
                    message: e.to_string(),
                    code: e.code().to_string(),
                });
                Err(e)
            }
        }
    }

    /// Drop a stopped or failed session, leaving its files on disk
    pub async fn discard(&self) -> RecorderResult<()> {
        let mut guard = self.inner.active.lock().await;
        match guard.as_ref().map(|a| a.session.state) {
            Some(SessionState::Stopped | SessionState::Failed | SessionState::Completed) => {
                tracing::info!("Discarding session; files are kept");
                self.clear(&mut guard);
                Ok(())
            }
            Some(state) => Err(RecorderError::InvalidState(format!(
                "Cannot discard while {:?}; stop first",
                state
            ))),
            None => Err(RecorderError::InvalidState("No session to discard".to_string())),
        }
    }
}
