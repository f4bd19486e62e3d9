//! Session Recorder - pausable screen recording sessions driven by FFmpeg.
//!
//! This is the main library crate. It resolves what to capture, plans the
//! encoder invocation, supervises one encoder process per segment and joins
//! the segments into the final recording.

pub mod capture;
pub mod commands;
pub mod config;
pub mod ffmpeg;
pub mod recorder;
pub mod settings;
pub mod utils;

pub use config::RecorderConfig;
pub use recorder::{RecorderEvent, RecordingOptions, SessionManager, SessionState};
pub use utils::{RecorderError, RecorderResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_recorder=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
