pub mod backend;
pub mod frame;
pub mod synthetic;

pub use backend::{AudioInput, CameraDevice, ScreenCapture};
pub use frame::{AudioFormat, AudioFrame, FrameSize, RawImage, Region};
pub use synthetic::{SineWaveInput, TestPatternCamera, TestPatternScreen};
