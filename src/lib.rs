pub mod capture;
pub mod config;
pub mod encode;
pub mod http;
pub mod record;
pub mod session;

pub use capture::{AudioFormat, AudioFrame, FrameSize, RawImage};
pub use config::Config;
pub use encode::{EncoderFactory, PngSequenceFactory, VideoCodec, WavFile};
pub use http::{create_router, AppState};
pub use record::{
    ErrorKind, FrameGrabber, HasFrameRate, HasFrequency, HasOutputFile, MultiRecorder, Recorder,
    RecorderError, RecorderResult, RecorderState, ScreenRecorder, SoundRecorder, StartPolicy,
    WebcamRecorder,
};
pub use session::{RecordingSession, SessionConfig, SessionStats};
