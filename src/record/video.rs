//! Video recorder over any frame source
//!
//! Locks, outermost first: the lifecycle control lock (held by every control
//! operation), then `source`, `timeline` and `encoder`, each taken briefly.
//! The grabber thread never touches the lifecycle lock, so `stop` can join it
//! while holding that lock. The encoder lock keeps `stop` from closing the
//! output underneath an in-flight encode.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::error::{ErrorKind, Operation, RecorderError, RecorderResult};
use super::grabber::{FrameGrabber, GrabberStats};
use super::lifecycle::{run_guarded, Lifecycle};
use super::recorder::{FrameCapturable, HasFrameRate, HasOutputFile, Previewable, Recorder};
use super::state::RecorderState;
use crate::capture::{FrameSize, RawImage};
use crate::encode::{Encoder, EncoderFactory, VideoCodec};

pub const DEFAULT_FPS: f64 = 25.0;

/// Where a video recorder gets its frames from
pub trait VideoSource: Send + 'static {
    /// Short description for logs, e.g. `"screen 800x600+0+0"`
    fn describe(&self) -> String;

    /// Validates the source configuration and acquires the device.
    /// Returns the size every captured frame will have.
    fn open(&mut self) -> Result<FrameSize, ErrorKind>;

    /// Captures one frame from the opened device
    fn capture_frame(&mut self) -> anyhow::Result<RawImage>;

    /// One-shot capture that works whether or not the device is open
    fn snapshot(&mut self) -> anyhow::Result<RawImage>;

    /// Releases the device
    fn close(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct VideoSettings {
    output: PathBuf,
    fps: f64,
    codec: VideoCodec,
}

struct EncoderHandle {
    encoder: Box<dyn Encoder>,
    stream: usize,
}

/// State shared with the frame grabber thread
struct Session<S> {
    name: String,
    source: Mutex<S>,
    encoder: Mutex<Option<EncoderHandle>>,
    timeline: Mutex<super::timeline::Timeline>,
    frames_encoded: AtomicU64,
}

impl<S: VideoSource> FrameCapturable for Session<S> {
    fn grab_frame(&self) -> RecorderResult<()> {
        let error = |kind| RecorderError::new(self.name.clone(), Operation::GrabFrame, kind);

        let frame = self
            .source
            .lock()
            .capture_frame()
            .map_err(|e| error(ErrorKind::backend("grab frame", e)))?;
        let pts = self.timeline.lock().presentation_time(Instant::now());

        let mut encoder = self.encoder.lock();
        let handle = encoder.as_mut().ok_or_else(|| error(ErrorKind::NotRecording))?;
        handle
            .encoder
            .encode_frame(handle.stream, &frame, u64::try_from(pts.as_millis()).unwrap_or(u64::MAX))
            .map_err(|e| error(ErrorKind::backend("encode frame", e)))?;

        self.frames_encoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records frames from a `VideoSource` at a fixed rate into an encoder
pub struct VideoRecorder<S: VideoSource> {
    lifecycle: Lifecycle,
    settings: Mutex<VideoSettings>,
    factory: Arc<dyn EncoderFactory>,
    session: Arc<Session<S>>,
    grabber: Mutex<Option<FrameGrabber>>,
    last_stats: Mutex<GrabberStats>,
}

impl<S: VideoSource> VideoRecorder<S> {
    pub fn new(name: impl Into<String>, source: S, factory: Arc<dyn EncoderFactory>) -> Self {
        let name = name.into();
        Self {
            lifecycle: Lifecycle::new(name.clone()),
            settings: Mutex::new(VideoSettings {
                output: PathBuf::from("."),
                fps: DEFAULT_FPS,
                codec: VideoCodec::default(),
            }),
            factory,
            session: Arc::new(Session {
                name,
                source: Mutex::new(source),
                encoder: Mutex::new(None),
                timeline: Mutex::new(Default::default()),
                frames_encoded: AtomicU64::new(0),
            }),
            grabber: Mutex::new(None),
            last_stats: Mutex::new(GrabberStats::default()),
        }
    }

    pub fn codec(&self) -> VideoCodec {
        self.settings.lock().codec
    }

    pub fn set_codec(&self, codec: VideoCodec) -> RecorderResult<()> {
        self.lifecycle.configure("video codec", || {
            self.settings.lock().codec = codec;
            Ok(())
        })
    }

    /// Frames handed to the encoder in the current (or last) session
    pub fn frames_encoded(&self) -> u64 {
        self.session.frames_encoded.load(Ordering::SeqCst)
    }

    /// Grabber counters of the running session, or of the last one
    pub fn grabber_stats(&self) -> GrabberStats {
        match self.grabber.lock().as_ref() {
            Some(grabber) => grabber.stats(),
            None => *self.last_stats.lock(),
        }
    }

    /// Changes source configuration; rejected once the recorder left `Idle`
    pub(crate) fn configure_source<T>(
        &self,
        field: &'static str,
        change: impl FnOnce(&mut S) -> Result<T, ErrorKind>,
    ) -> RecorderResult<T> {
        self.lifecycle
            .configure(field, || change(&mut self.session.source.lock()))
    }

    pub(crate) fn with_source<T>(&self, read: impl FnOnce(&S) -> T) -> T {
        read(&self.session.source.lock())
    }

    fn open_output(&self, settings: &VideoSettings) -> Result<(), ErrorKind> {
        validate_output(&settings.output)?;
        validate_fps(settings.fps)?;

        // A repeated setUp starts over with a fresh device and output
        self.close_output();

        let size = self.session.source.lock().open()?;
        let handle = match self.create_encoder(settings, size) {
            Ok(handle) => handle,
            Err(kind) => {
                if let Err(e) = self.session.source.lock().close() {
                    warn!("{}: failed to close capture device: {:#}", self.name(), e);
                }
                return Err(kind);
            }
        };
        *self.session.encoder.lock() = Some(handle);

        info!(
            "{}: set up {} -> {:?} ({}x{} @ {} fps)",
            self.name(),
            self.session.source.lock().describe(),
            settings.output,
            size.width,
            size.height,
            settings.fps
        );
        Ok(())
    }

    fn create_encoder(&self, settings: &VideoSettings, size: FrameSize) -> Result<EncoderHandle, ErrorKind> {
        let mut encoder = self
            .factory
            .create(&settings.output)
            .map_err(|e| ErrorKind::backend("create encoder", e))?;

        match encoder.add_stream(settings.codec, size) {
            Ok(stream) => Ok(EncoderHandle { encoder, stream }),
            Err(e) => {
                if let Err(close) = encoder.close() {
                    warn!("{}: failed to close encoder: {:#}", self.name(), close);
                }
                Err(ErrorKind::backend("add video stream", e))
            }
        }
    }

    /// Releases what an earlier setUp acquired, if anything
    fn close_output(&self) {
        let Some(mut previous) = self.session.encoder.lock().take() else {
            return;
        };
        if let Err(e) = previous.encoder.close() {
            warn!("{}: failed to close previous encoder: {:#}", self.name(), e);
        }
        if let Err(e) = self.session.source.lock().close() {
            warn!("{}: failed to close capture device: {:#}", self.name(), e);
        }
    }

    fn release(&self) -> Result<(), ErrorKind> {
        if let Some(mut grabber) = self.grabber.lock().take() {
            *self.last_stats.lock() = grabber.stop();
        }

        let mut first_error = None;

        if let Some(mut handle) = self.session.encoder.lock().take() {
            if let Err(e) = handle.encoder.close() {
                first_error.get_or_insert(ErrorKind::backend("close encoder", e));
            }
        }

        if let Err(e) = self.session.source.lock().close() {
            first_error.get_or_insert(ErrorKind::backend("close capture device", e));
        }

        match first_error {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }
}

impl<S: VideoSource> Recorder for VideoRecorder<S> {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn set_up(&self) -> RecorderResult<()> {
        self.lifecycle.set_up(|| {
            let settings = self.settings.lock().clone();
            self.open_output(&settings)
        })
    }

    fn start(&self) -> RecorderResult<()> {
        self.lifecycle.start(|| {
            if self.session.encoder.lock().is_none() {
                return Err(ErrorKind::NotSetUp);
            }

            let fps = self.settings.lock().fps;
            self.session.frames_encoded.store(0, Ordering::SeqCst);
            self.session.timeline.lock().start(Instant::now());

            let target: Arc<dyn FrameCapturable> = self.session.clone();
            let grabber = FrameGrabber::spawn(self.name(), fps, target)
                .map_err(|e| ErrorKind::backend("start frame grabber", e))?;
            *self.grabber.lock() = Some(grabber);
            Ok(())
        })
    }

    fn pause(&self) -> RecorderResult<()> {
        self.lifecycle.pause(|| {
            if let Some(grabber) = self.grabber.lock().as_ref() {
                grabber.pause();
            }
            self.session.timeline.lock().pause(Instant::now());
            Ok(())
        })
    }

    fn resume(&self) -> RecorderResult<()> {
        self.lifecycle.resume(|| {
            self.session.timeline.lock().resume(Instant::now());
            if let Some(grabber) = self.grabber.lock().as_ref() {
                grabber.resume();
            }
            Ok(())
        })
    }

    fn stop(&self) -> RecorderResult<()> {
        self.lifecycle.stop(|| {
            let result = self.release();
            info!("{}: {} frames encoded", self.name(), self.frames_encoded());
            result
        })
    }

    fn reset(&self) -> RecorderResult<()> {
        self.lifecycle.reset(|| {
            self.session.timeline.lock().reset();
            Ok(())
        })
    }

    fn state(&self) -> RecorderState {
        self.lifecycle.state()
    }
}

impl<S: VideoSource> HasOutputFile for VideoRecorder<S> {
    fn output(&self) -> PathBuf {
        self.settings.lock().output.clone()
    }

    fn set_output(&self, path: PathBuf) -> RecorderResult<()> {
        self.lifecycle.configure("output file", || {
            self.settings.lock().output = path;
            Ok(())
        })
    }

    fn default_extension(&self) -> &'static str {
        self.factory.extension()
    }
}

impl<S: VideoSource> HasFrameRate for VideoRecorder<S> {
    fn frames_per_second(&self) -> f64 {
        self.settings.lock().fps
    }

    fn set_frames_per_second(&self, fps: f64) -> RecorderResult<()> {
        self.lifecycle.configure("frame rate", || {
            validate_fps(fps)?;
            self.settings.lock().fps = fps;
            Ok(())
        })
    }
}

impl<S: VideoSource> Previewable for VideoRecorder<S> {
    fn grab_image(&self) -> RecorderResult<RawImage> {
        run_guarded("grab image", || {
            self.session
                .source
                .lock()
                .snapshot()
                .map_err(|e| ErrorKind::backend("grab image", e))
        })
        .map_err(|kind| self.lifecycle.error(Operation::GrabImage, kind))
    }
}

impl<S: VideoSource> Drop for VideoRecorder<S> {
    fn drop(&mut self) {
        let acquired = self.session.encoder.lock().is_some();
        if acquired || self.lifecycle.state().is_active() {
            if let Err(kind) = self.release() {
                warn!("{}: failed to release resources on drop: {}", self.name(), kind);
            }
        }
    }
}

pub(crate) fn validate_output(path: &Path) -> Result<(), ErrorKind> {
    if path.as_os_str().is_empty() {
        return Err(ErrorKind::InvalidConfig("no output file set".to_string()));
    }
    if path.is_dir() {
        return Err(ErrorKind::InvalidConfig(format!(
            "Output is pointing to a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

pub(crate) fn validate_fps(fps: f64) -> Result<(), ErrorKind> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(ErrorKind::InvalidConfig(format!(
            "Frames per second must be > 0, provided: {}",
            fps
        )))
    }
}
