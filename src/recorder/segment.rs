//! Segment recorder
//!
//! Runs one encoder process per segment. The process is driven by a single
//! task whose result is the segment's [`SegmentOutcome`]; stopping asks the
//! encoder to quit gracefully, then terminates it, then kills it.

use super::events::RecorderEvent;
use crate::config::Timings;
use crate::ffmpeg::progress::{parse_stats_line, ProgressParser};
use crate::utils::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

/// Diagnostic lines kept for error messages
const STDERR_TAIL_LINES: usize = 12;

/// How a segment's encoder process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Exited successfully on its own
    Completed,
    /// Ended because it was asked to stop
    Cancelled,
    /// Exited abnormally on its own
    Failed(String),
}

/// Spawns encoder processes for segments
#[derive(Debug, Clone)]
pub struct SegmentRecorder {
    ffmpeg_path: PathBuf,
    timings: Timings,
    events: broadcast::Sender<RecorderEvent>,
}

impl SegmentRecorder {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        timings: Timings,
        events: broadcast::Sender<RecorderEvent>,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timings,
            events,
        }
    }

    /// Spawn the encoder for segment `index` with a complete argument list
    pub fn start(&self, index: usize, args: Vec<String>, output: &Path) -> RecorderResult<SegmentHandle> {
        tracing::info!("Starting FFmpeg for segment {}: {:?}", index, args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RecorderError::EncoderProcess(format!(
                    "Failed to start {:?}: {}",
                    self.ffmpeg_path, e
                ))
            })?;

        let stdin = child.stdin.take();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        if let Some(stdout) = child.stdout.take() {
            let events = self.events.clone();
            tokio::spawn(async move {
                let mut parser = ProgressParser::new();
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(update) = parser.push_line(&line) {
                        let _ = events.send(RecorderEvent::Progress {
                            segment_index: index,
                            percent: update.percent,
                            timemark: update.timemark,
                            fps: update.fps,
                        });
                    }
                }
            });
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if line.is_empty() || parse_stats_line(line).is_some() {
                        continue;
                    }
                    tracing::debug!("FFmpeg (segment {}): {}", index, line);
                    let mut tail = tail.lock();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
            })
        });

        let manual_stop = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let driver = Driver {
            index,
            child,
            stdin,
            timings: self.timings,
            manual_stop: manual_stop.clone(),
            stderr_tail,
            stderr_task,
        };
        tokio::spawn(async move {
            let outcome = driver.run(stop_rx).await;
            let _ = outcome_tx.send(Some(outcome));
        });

        Ok(SegmentHandle {
            index,
            path: output.to_path_buf(),
            manual_stop,
            stop_tx: Some(stop_tx),
            outcome: outcome_rx,
        })
    }
}

/// Control handle of a running segment
#[derive(Debug)]
pub struct SegmentHandle {
    index: usize,
    path: PathBuf,
    manual_stop: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    outcome: watch::Receiver<Option<SegmentOutcome>>,
}

impl SegmentHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a deliberate stop is in flight or done
    pub fn is_manual_stop(&self) -> bool {
        self.manual_stop.load(Ordering::SeqCst)
    }

    /// Receiver that resolves once the process has ended
    pub fn outcome_receiver(&self) -> watch::Receiver<Option<SegmentOutcome>> {
        self.outcome.clone()
    }

    /// Ask the encoder to stop and wait until it has
    pub async fn stop(&mut self) -> SegmentOutcome {
        self.manual_stop.store(true, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        wait_outcome(self.outcome.clone()).await
    }
}

/// Wait on an outcome receiver until the driver reports
pub async fn wait_outcome(mut rx: watch::Receiver<Option<SegmentOutcome>>) -> SegmentOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(SegmentOutcome::Cancelled),
        Err(_) => SegmentOutcome::Failed("Encoder task ended without reporting".to_string()),
    }
}

/// Owns the child process for its whole life
struct Driver {
    index: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    timings: Timings,
    manual_stop: Arc<AtomicBool>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> SegmentOutcome {
        let status = tokio::select! {
            status = self.child.wait() => status,
            // A dropped handle counts as a stop request too
            _ = &mut stop_rx => {
                // The encoder may have died before the request arrived
                if let Ok(Some(status)) = self.child.try_wait() {
                    if !status.success() {
                        return self.crashed(status).await;
                    }
                }
                self.shutdown().await;
                return SegmentOutcome::Cancelled;
            }
        };

        match status {
            Ok(status) if status.success() => {
                if self.manual_stop.load(Ordering::SeqCst) {
                    return SegmentOutcome::Cancelled;
                }
                tracing::info!("FFmpeg for segment {} exited on its own", self.index);
                SegmentOutcome::Completed
            }
            // Nothing was sent to the process on this path, so a failure is a crash
            Ok(status) => self.crashed(status).await,
            Err(e) => SegmentOutcome::Failed(format!("Failed to wait for FFmpeg: {}", e)),
        }
    }

    async fn crashed(&mut self, status: ExitStatus) -> SegmentOutcome {
        // Let the reader drain what the process wrote before dying
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_millis(500), task).await;
        }
        let message = self.failure_message(status);
        tracing::error!("FFmpeg for segment {} failed: {}", self.index, message);
        SegmentOutcome::Failed(message)
    }

    fn failure_message(&self, status: ExitStatus) -> String {
        let tail = self.stderr_tail.lock();
        match tail.back() {
            Some(last) => format!("FFmpeg exited with {}: {}", status, last),
            None => format!("FFmpeg exited with {}", status),
        }
    }

    /// `q` on stdin, then terminate, then kill
    async fn shutdown(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::warn!("Failed to send 'q' to FFmpeg: {}", e);
            }
            let _ = stdin.shutdown().await;
        }

        if self.wait_for_exit(self.timings.graceful_stop_timeout()).await {
            tracing::info!("FFmpeg for segment {} stopped gracefully", self.index);
            return;
        }

        tracing::warn!("FFmpeg for segment {} ignored 'q'; terminating", self.index);
        if let Some(pid) = self.child.id() {
            terminate(pid).await;
        }
        if self.wait_for_exit(self.timings.terminate_timeout()).await {
            return;
        }

        tracing::warn!("FFmpeg for segment {} still running; killing", self.index);
        if let Err(e) = self.child.kill().await {
            tracing::error!("Failed to kill FFmpeg for segment {}: {}", self.index, e);
        }
    }

    async fn wait_for_exit(&mut self, timeout: std::time::Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.child.wait()).await,
            Ok(Ok(_))
        )
    }
}

/// Polite termination request to another process
async fn terminate(pid: u32) {
    #[cfg(unix)]
    let result = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdin(Stdio::null())
        .output()
        .await;

    #[cfg(windows)]
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .output()
        .await;

    #[cfg(not(any(unix, windows)))]
    let result: std::io::Result<std::process::Output> =
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no terminate signal"));

    if let Err(e) = result {
        tracing::warn!("Terminate request for pid {} failed: {}", pid, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_timings() -> Timings {
        Timings {
            countdown_tick_ms: 10,
            timer_interval_ms: 10,
            graceful_stop_timeout_ms: 200,
            terminate_timeout_ms: 200,
            settle_delay_ms: 10,
        }
    }

    fn sh_recorder() -> (SegmentRecorder, broadcast::Receiver<RecorderEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (SegmentRecorder::new("/bin/sh", fast_timings(), tx), rx)
    }

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    #[tokio::test]
    async fn test_graceful_stop_via_stdin() {
        let (recorder, _rx) = sh_recorder();
        let mut handle = recorder
            .start(0, script("read x; exit 0"), Path::new("unused.mp4"))
            .unwrap();
        assert_eq!(handle.stop().await, SegmentOutcome::Cancelled);
        assert!(handle.is_manual_stop());
    }

    #[tokio::test]
    async fn test_stubborn_process_is_killed() {
        let (recorder, _rx) = sh_recorder();
        let mut handle = recorder
            .start(0, script("trap '' TERM; while true; do sleep 1; done"), Path::new("unused.mp4"))
            .unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop must finish after escalation");
        assert_eq!(outcome, SegmentOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_crash_reported_with_stderr() {
        let (recorder, _rx) = sh_recorder();
        let handle = recorder
            .start(0, script("echo 'Device not found' >&2; exit 3"), Path::new("unused.mp4"))
            .unwrap();
        match wait_outcome(handle.outcome_receiver()).await {
            SegmentOutcome::Failed(message) => assert!(message.contains("Device not found"), "{message}"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!handle.is_manual_stop());
    }

    #[tokio::test]
    async fn test_crash_before_stop_is_still_a_failure() {
        let (recorder, _rx) = sh_recorder();
        let mut handle = recorder
            .start(0, script("echo 'Broken pipe' >&2; exit 2"), Path::new("unused.mp4"))
            .unwrap();

        // Block the runtime so the driver cannot notice the exit before the stop
        std::thread::sleep(Duration::from_millis(300));

        match handle.stop().await {
            SegmentOutcome::Failed(message) => assert!(message.contains("Broken pipe"), "{message}"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (recorder, mut rx) = sh_recorder();
        let handle = recorder
            .start(
                4,
                script("printf 'fps=30.0\\nout_time=00:00:01.000000\\nprogress=continue\\n'; exit 0"),
                Path::new("unused.mp4"),
            )
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RecorderEvent::Progress {
                segment_index: 4,
                percent: None,
                timemark: Some("00:00:01.000000".to_string()),
                fps: Some(30.0),
            }
        );
        assert_eq!(wait_outcome(handle.outcome_receiver()).await, SegmentOutcome::Completed);
    }

    #[tokio::test]
    async fn test_missing_binary_is_encoder_error() {
        let (tx, _rx) = broadcast::channel(4);
        let recorder = SegmentRecorder::new("/nonexistent/ffmpeg", fast_timings(), tx);
        let err = recorder.start(0, Vec::new(), Path::new("x.mp4")).unwrap_err();
        assert_eq!(err.code(), "ENCODER_PROCESS_ERROR");
    }
}
