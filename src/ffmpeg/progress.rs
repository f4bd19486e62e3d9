//! Encoder progress parsing
//!
//! `-progress pipe:1` writes blocks of `key=value` lines, each block closed
//! by a `progress=continue` or `progress=end` line. The classic one-line
//! stats format on stderr is understood as well.

use serde::Serialize;

/// One progress report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    /// Position in the output as `HH:MM:SS.micros`
    pub timemark: Option<String>,
    pub out_time_ms: Option<u64>,
    pub speed: Option<String>,
    /// Completion percentage. A live capture has no known end, so this
    /// stays unset for recordings.
    pub percent: Option<f64>,
    /// Last block before the encoder exits
    pub ended: bool,
}

/// Accumulates progress lines into [`ProgressUpdate`] blocks
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressUpdate,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a finished block when `line` closes it
    pub fn push_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => self.current.frame = value.parse().ok(),
            "fps" => self.current.fps = value.parse().ok(),
            // Despite the name, out_time_ms is in microseconds
            "out_time_us" | "out_time_ms" => {
                self.current.out_time_ms = value.parse::<u64>().ok().map(|us| us / 1000)
            }
            "out_time" => self.current.timemark = Some(value.to_string()),
            "speed" => self.current.speed = Some(value.to_string()),
            "progress" => {
                let mut update = std::mem::take(&mut self.current);
                update.ended = value == "end";
                if update.out_time_ms.is_none() {
                    update.out_time_ms = update.timemark.as_deref().and_then(timemark_to_ms);
                }
                return Some(update);
            }
            _ => {}
        }

        None
    }
}

/// Value following `key` in a stats line, e.g. `extract_value(line, "fps=")`
pub fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let value = line[start..].trim_start().split_whitespace().next()?;
    Some(value.to_string())
}

/// Parse a classic `frame=  120 fps= 30 ... time=00:00:04.00 ...` stats line
pub fn parse_stats_line(line: &str) -> Option<ProgressUpdate> {
    if !(line.contains("time=") && line.contains("bitrate=")) {
        return None;
    }

    let timemark = extract_value(line, "time=");
    Some(ProgressUpdate {
        frame: extract_value(line, "frame=").and_then(|v| v.parse().ok()),
        fps: extract_value(line, "fps=").and_then(|v| v.parse().ok()),
        out_time_ms: timemark.as_deref().and_then(timemark_to_ms),
        timemark,
        speed: extract_value(line, "speed="),
        percent: None,
        ended: false,
    })
}

/// `HH:MM:SS[.frac]` to milliseconds
pub fn timemark_to_ms(timemark: &str) -> Option<u64> {
    let mut parts = timemark.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || seconds < 0.0 {
        return None;
    }
    Some((hours * 3600 + minutes * 60) * 1000 + (seconds * 1000.0).round() as u64)
}
