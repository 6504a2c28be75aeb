//! Inter-process communication between studytime and studytimectl
//!
//! We use Unix domain sockets for local IPC - one JSON command per line,
//! one JSON response back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Which way the clock runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimerMode {
    /// Counts down from the configured duration to zero.
    #[default]
    #[serde(rename = "timer")]
    Countdown,
    /// Counts up from zero without bound.
    #[serde(rename = "stopwatch")]
    Stopwatch,
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerMode::Countdown => write!(f, "timer"),
            TimerMode::Stopwatch => write!(f, "stopwatch"),
        }
    }
}

impl FromStr for TimerMode {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timer" | "countdown" => Ok(TimerMode::Countdown),
            "stopwatch" => Ok(TimerMode::Stopwatch),
            other => Err(IpcError::UnknownMode(other.to_string())),
        }
    }
}

/// Commands that studytimectl can send to studytime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Reset,
    SetMode { mode: TimerMode },
    SetDuration { minutes: u64, seconds: u64 },
    SetAlarm { id: String },
    SetSubject { subject_id: Option<i64> },
    SetTopic { topic: String },
    SetSessionStart { at: Option<DateTime<Utc>> },
    Status,
}

/// Responses from studytime back to studytimectl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(TimerStatus),
    Error(String),
}

/// Point-in-time view of the timer and the study session it tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerStatus {
    pub mode: TimerMode,
    pub state: TimerState,
    /// Remaining seconds in countdown mode, elapsed seconds in stopwatch mode.
    pub seconds: u64,
    /// Configured countdown length in seconds.
    pub initial_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub alarm: String,
    pub subject_id: Option<i64>,
    pub topic: String,
    pub session_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
}

impl TimerState {
    pub fn from_flags(is_running: bool, is_paused: bool) -> Self {
        match (is_running, is_paused) {
            (true, true) => TimerState::Paused,
            (true, false) => TimerState::Running,
            _ => TimerState::Idle,
        }
    }
}

/// Format seconds as `MM:SS`, or `H:MM:SS` past the hour.
pub fn format_clock(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused - is studytime running?")]
    ConnectionRefused,

    #[error("Unknown timer mode '{0}', expected 'timer' or 'stopwatch'")]
    UnknownMode(String),
}

pub const SOCKET_PATH: &str = "/tmp/studytime.sock";

/// Send one command to the daemon listening on `socket` and wait for its reply.
pub async fn request(socket: &Path, command: &Command) -> Result<Response, IpcError> {
    let mut stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;

    // Send command
    let mut msg = serde_json::to_vec(command)?;
    msg.push(b'\n');
    stream.write_all(&msg).await?;

    // Read response; the daemon closes the connection after replying
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}
