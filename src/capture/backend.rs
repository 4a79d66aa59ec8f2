use anyhow::Result;
use tokio::sync::mpsc;

use super::frame::{AudioFormat, AudioFrame, FrameSize, RawImage, Region};

/// Screen grab primitive
///
/// Implementations wrap the platform API (or a synthetic source for tests).
pub trait ScreenCapture: Send + 'static {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Size of the default screen
    fn screen_size(&self) -> Result<FrameSize>;

    /// Acquire whatever the backend needs to grab the screen
    fn open(&mut self) -> Result<()>;

    /// Grab the given region of the screen
    fn capture(&mut self, region: Region) -> Result<RawImage>;

    /// Current mouse position in screen coordinates, if known
    fn cursor_position(&self) -> Option<(i32, i32)>;

    fn close(&mut self) -> Result<()>;
}

/// Webcam device driver
pub trait CameraDevice: Send + 'static {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Names of the cameras currently attached; the first one is the default
    fn devices(&self) -> Result<Vec<String>>;

    /// Open the named camera at the given view size
    fn open(&mut self, device: &str, size: FrameSize) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Grab the current image of the open camera
    fn capture(&mut self) -> Result<RawImage>;

    fn close(&mut self) -> Result<()>;
}

/// Audio line
///
/// `start` hands out the receiving end of the sample stream; `stop` must
/// drop the sending end so that consumers see the stream end.
pub trait AudioInput: Send + 'static {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Acquire the line for the given format
    fn open(&mut self, format: AudioFormat) -> Result<()>;

    /// Start capturing; frames arrive on the returned channel
    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the line
    fn stop(&mut self) -> Result<()>;
}
