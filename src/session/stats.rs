use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::encode::WavSummary;
use crate::record::{Controls, GrabberStats, RecorderState};

/// Snapshot of a recording session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Aggregate state of all recorders
    pub state: RecorderState,

    pub is_recording: bool,
    pub is_paused: bool,
    pub is_stopped: bool,

    /// Which controls a client should offer right now
    pub controls: Controls,

    /// When the current (or last) recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Wall-clock duration, including pauses
    pub duration_secs: f64,

    pub recorders: Vec<RecorderStats>,
}

/// Snapshot of one recorder of the session
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStats {
    pub name: String,
    pub state: RecorderState,
    pub output: PathBuf,

    /// Video only: frames handed to the encoder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_encoded: Option<u64>,

    /// Video only: frame grabber counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grabber: Option<GrabberStats>,

    /// Sound only: the finished WAV file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<WavSummary>,
}
