use std::path::PathBuf;

use super::error::RecorderResult;
use super::state::{Controls, RecorderState};
use crate::capture::RawImage;

/// Capability shared by every recorder: set up, start, pause, resume, stop.
///
/// Control operations take `&self`; implementations serialize them internally
/// so a recorder can be shared between a control thread and its own workers.
pub trait Recorder: Send + Sync {
    /// Identity used to prefix errors and log lines
    fn name(&self) -> &str;

    /// Validates the configuration and acquires backend resources
    fn set_up(&self) -> RecorderResult<()>;

    fn start(&self) -> RecorderResult<()>;

    fn pause(&self) -> RecorderResult<()>;

    fn resume(&self) -> RecorderResult<()>;

    /// Stops recording and releases backend resources
    fn stop(&self) -> RecorderResult<()>;

    /// Returns to `Idle` keeping the configuration, so the recorder can be reused
    fn reset(&self) -> RecorderResult<()>;

    fn state(&self) -> RecorderState;

    fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    fn is_paused(&self) -> bool {
        self.state() == RecorderState::Paused
    }

    fn is_stopped(&self) -> bool {
        self.state() == RecorderState::Stopped
    }

    /// Whether pause/resume actually suspend the output
    fn can_pause_and_resume(&self) -> bool {
        true
    }

    fn controls(&self) -> Controls {
        Controls::from_flags(self.is_recording(), self.is_paused())
    }
}

/// A recorder writing to a single output file
pub trait HasOutputFile: Recorder {
    fn output(&self) -> PathBuf;

    /// Rejected once the recorder left `Idle`
    fn set_output(&self, path: PathBuf) -> RecorderResult<()>;

    /// Extension (no dot) the output file should carry
    fn default_extension(&self) -> &'static str;
}

/// A recorder producing frames at a fixed rate
pub trait HasFrameRate: Recorder {
    fn frames_per_second(&self) -> f64;

    /// Must be > 0; rejected once the recorder left `Idle`
    fn set_frames_per_second(&self, fps: f64) -> RecorderResult<()>;
}

/// A recorder sampling audio at a fixed frequency
pub trait HasFrequency: Recorder {
    fn frequency(&self) -> u32;

    /// Must be > 0; rejected once the recorder left `Idle`
    fn set_frequency(&self, hz: u32) -> RecorderResult<()>;
}

/// Per-frame capture hook driven by a `FrameGrabber`
pub trait FrameCapturable: Send + Sync {
    /// Grabs one frame and hands it to the encoder
    fn grab_frame(&self) -> RecorderResult<()>;
}

/// One-shot capture outside of any recording session
pub trait Previewable: Send + Sync {
    fn grab_image(&self) -> RecorderResult<RawImage>;
}
