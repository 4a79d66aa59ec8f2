//! Recording orchestration
//!
//! Recorders share one state machine (`lifecycle`), expose their abilities
//! through small capability traits (`recorder`) and, for video, are driven by
//! a per-session `FrameGrabber`. `MultiRecorder` treats several of them as a
//! single session.

pub mod error;
pub mod grabber;
pub mod lifecycle;
pub mod multi;
pub mod preview;
pub mod recorder;
pub mod screen;
pub mod sound;
pub mod state;
pub mod timeline;
pub mod video;
pub mod webcam;

pub use error::{ErrorKind, Operation, RecorderError, RecorderResult};
pub use grabber::{FrameGrabber, GrabberStats, PAUSE_POLL};
pub use lifecycle::Lifecycle;
pub use multi::{ChildOutcome, MultiRecorder, StartPolicy};
pub use preview::{PreviewFrame, PreviewPoller};
pub use recorder::{FrameCapturable, HasFrameRate, HasFrequency, HasOutputFile, Previewable, Recorder};
pub use screen::{ScreenRecorder, ScreenRegion, ScreenSource};
pub use sound::SoundRecorder;
pub use state::{Action, Controls, RecorderState};
pub use timeline::Timeline;
pub use video::{VideoRecorder, VideoSource};
pub use webcam::{WebcamRecorder, WebcamSource};
