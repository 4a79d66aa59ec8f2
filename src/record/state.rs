use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ErrorKind;

/// Lifecycle state of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Constructed (or reset), not started yet
    #[default]
    Idle,
    /// Actively recording
    Recording,
    /// Recording suspended, can be resumed
    Paused,
    /// Recording finished, resources released
    Stopped,
}

/// A control operation that moves a recorder between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl RecorderState {
    /// Returns the state reached by applying `action`, or the reason the
    /// action is illegal from the current state.
    ///
    /// This is the only place that knows which transitions exist:
    ///
    /// ```text
    /// Idle      --start-->  Recording
    /// Recording --pause-->  Paused
    /// Paused    --resume--> Recording
    /// Recording --stop-->   Stopped
    /// Paused    --stop-->   Stopped
    /// Idle|Stopped --reset--> Idle
    /// ```
    pub fn apply(self, action: Action) -> Result<RecorderState, ErrorKind> {
        use RecorderState::*;

        match (action, self) {
            (Action::Start, Idle) => Ok(Recording),
            (Action::Start, _) => Err(ErrorKind::AlreadyStarted),

            (Action::Pause, Recording) => Ok(Paused),
            (Action::Pause, Paused) => Err(ErrorKind::AlreadyPaused),
            (Action::Pause, _) => Err(ErrorKind::NotRecording),

            (Action::Resume, Paused) => Ok(Recording),
            (Action::Resume, _) => Err(ErrorKind::NotPaused),

            (Action::Stop, Recording | Paused) => Ok(Stopped),
            (Action::Stop, _) => Err(ErrorKind::NotRecording),

            (Action::Reset, Idle | Stopped) => Ok(Idle),
            (Action::Reset, _) => Err(ErrorKind::StillRecording),
        }
    }

    /// Recording or paused: a session is in progress and holds resources
    pub fn is_active(self) -> bool {
        matches!(self, RecorderState::Recording | RecorderState::Paused)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Which controls a caller should offer for a given aggregate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub record: bool,
    pub pause_resume: bool,
    pub stop: bool,
}

impl Controls {
    pub fn from_flags(is_recording: bool, is_paused: bool) -> Self {
        let active = is_recording || is_paused;
        Self {
            record: !active,
            pause_resume: active,
            stop: active,
        }
    }
}
