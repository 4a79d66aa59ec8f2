use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The recorder operation an error was reported from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SetUp,
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    Configure,
    GrabFrame,
    GrabImage,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::SetUp => "setUp",
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Stop => "stop",
            Operation::Reset => "reset",
            Operation::Configure => "configure",
            Operation::GrabFrame => "grabFrame",
            Operation::GrabImage => "grabImage",
        };
        f.write_str(name)
    }
}

/// What went wrong, independent of which recorder reported it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Recording already started")]
    AlreadyStarted,

    #[error("Already paused")]
    AlreadyPaused,

    #[error("Not recording currently")]
    NotRecording,

    #[error("Not paused currently")]
    NotPaused,

    #[error("Recording in progress, stop it first")]
    StillRecording,

    #[error("Cannot change {0} once recording has commenced")]
    ConfigLocked(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Recorder has not been set up")]
    NotSetUp,

    #[error("Cannot {0}")]
    Unsupported(&'static str),

    #[error("Failed to {action}: {detail}")]
    Backend { action: &'static str, detail: String },
}

impl ErrorKind {
    /// Wraps a backend failure, keeping the whole context chain
    pub fn backend(action: &'static str, err: anyhow::Error) -> Self {
        ErrorKind::Backend {
            action,
            detail: format!("{:#}", err),
        }
    }

    /// The operation was illegal in the current state and nothing was attempted
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ErrorKind::AlreadyStarted
                | ErrorKind::AlreadyPaused
                | ErrorKind::NotRecording
                | ErrorKind::NotPaused
                | ErrorKind::StillRecording
                | ErrorKind::ConfigLocked(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ErrorKind::InvalidConfig(_) | ErrorKind::NotSetUp)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ErrorKind::Unsupported(_))
    }
}

/// Error reported by a recorder, prefixed with the recorder's identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{recorder}: [{op}] {kind}")]
pub struct RecorderError {
    /// Name of the recorder that reported the error
    pub recorder: String,
    /// Operation that failed
    pub op: Operation,
    /// Cause
    pub kind: ErrorKind,
}

impl RecorderError {
    pub fn new(recorder: impl Into<String>, op: Operation, kind: ErrorKind) -> Self {
        Self {
            recorder: recorder.into(),
            op,
            kind,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.kind.is_rejection()
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind.is_unsupported()
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
