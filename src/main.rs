use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use session_recorder::commands::{recording, CommandResponse};
use session_recorder::{RecorderConfig, RecorderEvent, SessionManager, SessionState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "session-recorder")]
#[command(about = "Record the screen through FFmpeg in pausable sessions")]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record for a while, then stop and finalize
    Record {
        /// Seconds to record after the countdown
        #[arg(short, long, default_value = "10")]
        duration_secs: u64,

        /// Recording options as JSON
        #[arg(short, long)]
        options: Option<String>,

        /// Preset applied before the options
        #[arg(short, long)]
        preset: Option<String>,
    },
    /// List audio devices, cameras and displays
    Devices,
    /// List presets and the options they set
    Presets,
}

fn print(response: &CommandResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.to_json())?);
    Ok(())
}

fn check(response: CommandResponse, step: &str) -> Result<()> {
    print(&response)?;
    if !response.success {
        bail!("{} failed", step);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    session_recorder::init_logging();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RecorderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RecorderConfig::from_env(),
    };
    config.validate()?;

    info!("Session Recorder v{}", env!("CARGO_PKG_VERSION"));
    let manager = SessionManager::new(config)?;

    match args.command {
        Command::Record {
            duration_secs,
            options,
            preset,
        } => record(&manager, duration_secs, options, preset).await,
        Command::Devices => {
            print(&recording::get_audio_devices(&manager).await)?;
            print(&recording::get_cameras(&manager).await)?;
            print(&recording::get_displays(&manager))
        }
        Command::Presets => print(&recording::get_presets()),
    }
}

async fn record(
    manager: &SessionManager,
    duration_secs: u64,
    options: Option<String>,
    preset: Option<String>,
) -> Result<()> {
    let mut request: Value = match options {
        Some(raw) => serde_json::from_str(&raw).context("Options must be a JSON object")?,
        None => json!({}),
    };
    if let (Some(preset), Some(object)) = (preset, request.as_object_mut()) {
        object.insert("preset".to_string(), Value::String(preset));
    }

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecorderEvent::Progress { .. } | RecorderEvent::Timer { .. } => {
                    tracing::debug!("{:?}", event)
                }
                RecorderEvent::Countdown { remaining } => info!("Recording in {}...", remaining),
                other => info!("{:?}", other),
            }
        }
    });

    check(recording::start_recording(manager, request).await, "Start")?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
    }

    let stopped = recording::stop_recording(manager).await;
    print(&stopped)?;
    // An empty last segment still leaves the earlier ones to finalize
    if !stopped.success && manager.state() != SessionState::Stopped {
        bail!("Stop failed");
    }
    check(recording::finalize_recording(manager).await, "Finalize")
}
