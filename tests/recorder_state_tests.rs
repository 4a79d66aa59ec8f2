// Integration tests for the recorder state machine
//
// These tests drive recorders through every control operation and check
// that only the documented transitions succeed, that rejected operations
// leave the state untouched, and that configuration is frozen once a
// recording has begun.

use anyhow::Result;
use screencast::capture::{FrameSize, Region, ScreenCapture, TestPatternScreen};
use screencast::encode::{Encoder, EncoderFactory, VideoCodec};
use screencast::record::{
    ErrorKind, HasFrameRate, HasOutputFile, Lifecycle, Operation, Recorder, RecorderResult,
    RecorderState, ScreenRecorder, ScreenRegion,
};
use screencast::RawImage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Recorder without a backend: every hook succeeds
struct NullRecorder {
    lifecycle: Lifecycle,
}

impl NullRecorder {
    fn new(name: &str) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
        }
    }
}

impl Recorder for NullRecorder {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn set_up(&self) -> RecorderResult<()> {
        self.lifecycle.set_up(|| Ok(()))
    }

    fn start(&self) -> RecorderResult<()> {
        self.lifecycle.start(|| Ok(()))
    }

    fn pause(&self) -> RecorderResult<()> {
        self.lifecycle.pause(|| Ok(()))
    }

    fn resume(&self) -> RecorderResult<()> {
        self.lifecycle.resume(|| Ok(()))
    }

    fn stop(&self) -> RecorderResult<()> {
        self.lifecycle.stop(|| Ok(()))
    }

    fn reset(&self) -> RecorderResult<()> {
        self.lifecycle.reset(|| Ok(()))
    }

    fn state(&self) -> RecorderState {
        self.lifecycle.state()
    }
}

/// Encoder that only counts frames
#[derive(Default)]
struct CountingFactory {
    frames: Arc<AtomicU64>,
}

struct CountingEncoder {
    frames: Arc<AtomicU64>,
}

impl EncoderFactory for CountingFactory {
    fn extension(&self) -> &'static str {
        "count"
    }

    fn create(&self, _output: &Path) -> anyhow::Result<Box<dyn Encoder>> {
        Ok(Box::new(CountingEncoder {
            frames: Arc::clone(&self.frames),
        }))
    }
}

impl Encoder for CountingEncoder {
    fn add_stream(&mut self, _codec: VideoCodec, _size: FrameSize) -> anyhow::Result<usize> {
        Ok(0)
    }

    fn encode_frame(&mut self, _stream: usize, _frame: &RawImage, _pts_ms: u64) -> anyhow::Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Test-pattern screen that counts device opens and closes
struct CountingScreen {
    inner: TestPatternScreen,
    is_open: bool,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl CountingScreen {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let screen = Self {
            inner: TestPatternScreen::new(FrameSize::new(320, 240)),
            is_open: false,
            opens: Arc::clone(&opens),
            closes: Arc::clone(&closes),
        };
        (screen, opens, closes)
    }
}

impl ScreenCapture for CountingScreen {
    fn name(&self) -> &str {
        "counting screen"
    }

    fn screen_size(&self) -> anyhow::Result<FrameSize> {
        self.inner.screen_size()
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.is_open = true;
        self.inner.open()
    }

    fn capture(&mut self, region: Region) -> anyhow::Result<RawImage> {
        self.inner.capture(region)
    }

    fn cursor_position(&self) -> Option<(i32, i32)> {
        None
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.is_open {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.is_open = false;
        }
        self.inner.close()
    }
}

/// Where a broken encoder gives up
#[derive(Clone, Copy)]
enum Breakage {
    Create,
    AddStream,
}

struct BrokenFactory(Breakage);

struct BrokenEncoder;

impl EncoderFactory for BrokenFactory {
    fn extension(&self) -> &'static str {
        "broken"
    }

    fn create(&self, _output: &Path) -> anyhow::Result<Box<dyn Encoder>> {
        match self.0 {
            Breakage::Create => anyhow::bail!("disk full"),
            Breakage::AddStream => Ok(Box::new(BrokenEncoder)),
        }
    }
}

impl Encoder for BrokenEncoder {
    fn add_stream(&mut self, _codec: VideoCodec, _size: FrameSize) -> anyhow::Result<usize> {
        anyhow::bail!("codec unavailable")
    }

    fn encode_frame(&mut self, _stream: usize, _frame: &RawImage, _pts_ms: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Encoder whose close takes a while, like flushing a large file
struct SlowCloseFactory(Duration);

struct SlowCloseEncoder(Duration);

impl EncoderFactory for SlowCloseFactory {
    fn extension(&self) -> &'static str {
        "slow"
    }

    fn create(&self, _output: &Path) -> anyhow::Result<Box<dyn Encoder>> {
        Ok(Box::new(SlowCloseEncoder(self.0)))
    }
}

impl Encoder for SlowCloseEncoder {
    fn add_stream(&mut self, _codec: VideoCodec, _size: FrameSize) -> anyhow::Result<usize> {
        Ok(0)
    }

    fn encode_frame(&mut self, _stream: usize, _frame: &RawImage, _pts_ms: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        thread::sleep(self.0);
        Ok(())
    }
}

fn screen_recorder(dir: &TempDir) -> Result<ScreenRecorder<TestPatternScreen>> {
    let recorder = ScreenRecorder::screen(
        "screen",
        TestPatternScreen::new(FrameSize::new(320, 240)),
        Arc::new(CountingFactory::default()),
    );
    recorder.set_output(dir.path().join("screen.count"))?;
    recorder.set_frames_per_second(20.0)?;
    Ok(recorder)
}

#[test]
fn test_start_after_construction_then_second_start_fails() {
    let recorder = NullRecorder::new("null");

    recorder.start().unwrap();
    assert_eq!(recorder.state(), RecorderState::Recording);
    assert!(recorder.is_recording());

    let err = recorder.start().unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyStarted);
    assert_eq!(err.to_string(), "null: [start] Recording already started");
    assert_eq!(recorder.state(), RecorderState::Recording);
}

#[test]
fn test_pause_only_from_recording() {
    let recorder = NullRecorder::new("null");

    assert_eq!(recorder.pause().unwrap_err().kind, ErrorKind::NotRecording);
    assert_eq!(recorder.state(), RecorderState::Idle);

    recorder.start().unwrap();
    recorder.pause().unwrap();
    assert!(recorder.is_paused());

    assert_eq!(recorder.pause().unwrap_err().kind, ErrorKind::AlreadyPaused);
    assert_eq!(recorder.state(), RecorderState::Paused);

    recorder.stop().unwrap();
    assert_eq!(recorder.pause().unwrap_err().kind, ErrorKind::NotRecording);
    assert_eq!(recorder.state(), RecorderState::Stopped);
}

#[test]
fn test_resume_only_from_paused() {
    let recorder = NullRecorder::new("null");

    assert_eq!(recorder.resume().unwrap_err().kind, ErrorKind::NotPaused);

    recorder.start().unwrap();
    assert_eq!(recorder.resume().unwrap_err().kind, ErrorKind::NotPaused);
    assert_eq!(recorder.state(), RecorderState::Recording);

    recorder.pause().unwrap();
    recorder.resume().unwrap();
    assert_eq!(recorder.state(), RecorderState::Recording);

    recorder.stop().unwrap();
    assert_eq!(recorder.resume().unwrap_err().kind, ErrorKind::NotPaused);
}

#[test]
fn test_stop_from_recording_or_paused() {
    let recorder = NullRecorder::new("null");
    assert_eq!(recorder.stop().unwrap_err().kind, ErrorKind::NotRecording);
    assert_eq!(recorder.state(), RecorderState::Idle);

    recorder.start().unwrap();
    recorder.stop().unwrap();
    assert!(recorder.is_stopped());
    assert_eq!(recorder.stop().unwrap_err().kind, ErrorKind::NotRecording);

    recorder.reset().unwrap();
    recorder.start().unwrap();
    recorder.pause().unwrap();
    recorder.stop().unwrap();
    assert_eq!(recorder.state(), RecorderState::Stopped);
}

#[test]
fn test_reset_rejected_while_active() {
    let recorder = NullRecorder::new("null");
    recorder.start().unwrap();

    let err = recorder.reset().unwrap_err();
    assert_eq!(err.kind, ErrorKind::StillRecording);
    assert!(err.is_rejection());
    assert_eq!(recorder.state(), RecorderState::Recording);
}

#[test]
fn test_controls_follow_state() {
    let recorder = NullRecorder::new("null");
    let idle = recorder.controls();
    assert!(idle.record && !idle.pause_resume && !idle.stop);

    recorder.start().unwrap();
    recorder.pause().unwrap();
    let paused = recorder.controls();
    assert!(!paused.record && paused.pause_resume && paused.stop);
}

#[test]
fn test_start_without_set_up_fails_and_stays_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = screen_recorder(&dir)?;

    let err = recorder.start().unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotSetUp);
    assert!(err.to_string().starts_with("screen: [start]"));
    assert_eq!(recorder.state(), RecorderState::Idle);
    Ok(())
}

#[test]
fn test_set_up_rejects_directory_output() {
    let recorder = ScreenRecorder::screen(
        "screen",
        TestPatternScreen::default(),
        Arc::new(CountingFactory::default()),
    );

    // Default output is the current directory
    let err = recorder.set_up().unwrap_err();
    assert_eq!(err.op, Operation::SetUp);
    assert!(err.kind.is_config(), "{err}");
    assert!(err.to_string().contains("directory"));
}

#[test]
fn test_set_up_rejects_invalid_region() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = screen_recorder(&dir)?;
    recorder.set_region(ScreenRegion::new(0, 0, 0, 100))?;

    let err = recorder.set_up().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidConfig(_)), "{err}");
    assert_eq!(recorder.state(), RecorderState::Idle);
    Ok(())
}

#[test]
fn test_configuration_frozen_while_recording() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = screen_recorder(&dir)?;
    assert!(recorder.set_frames_per_second(0.0).unwrap_err().kind.is_config());

    recorder.set_up()?;
    recorder.start()?;

    let err = recorder.set_frames_per_second(5.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigLocked("frame rate"));
    assert_eq!(recorder.frames_per_second(), 20.0);

    let err = recorder.set_output(dir.path().join("other.count")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigLocked("output file"));

    let err = recorder.set_region(ScreenRegion::new(0, 0, 10, 10)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigLocked("screen region"));

    let err = recorder.set_up().unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyStarted);

    recorder.stop()?;
    Ok(())
}

#[test]
fn test_reset_preserves_configuration() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = screen_recorder(&dir)?;
    recorder.set_region(ScreenRegion::new(10, 20, 100, -1))?;
    recorder.set_capture_mouse(false)?;

    recorder.set_up()?;
    recorder.start()?;
    recorder.stop()?;
    recorder.reset()?;

    assert_eq!(recorder.state(), RecorderState::Idle);
    assert_eq!(recorder.frames_per_second(), 20.0);
    assert_eq!(recorder.output(), dir.path().join("screen.count"));
    assert_eq!(recorder.region(), ScreenRegion::new(10, 20, 100, -1));
    assert!(!recorder.capture_mouse());

    // And the recorder can be used again
    recorder.set_up()?;
    recorder.start()?;
    recorder.stop()?;
    Ok(())
}

#[test]
fn test_grab_image_outside_of_session() -> Result<()> {
    use screencast::record::Previewable;

    let dir = TempDir::new()?;
    let recorder = screen_recorder(&dir)?;
    recorder.set_region(ScreenRegion::new(0, 0, 64, 32))?;

    let image = recorder.grab_image()?;
    assert_eq!(image.size(), FrameSize::new(64, 32));
    assert_eq!(recorder.state(), RecorderState::Idle);
    Ok(())
}

#[test]
fn test_concurrent_control_calls_keep_state_consistent() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = Arc::new(screen_recorder(&dir)?);
    recorder.set_up()?;
    recorder.start()?;

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                for _ in 0..20 {
                    let _ = if i % 2 == 0 { recorder.pause() } else { recorder.resume() };
                }
                let _ = recorder.stop();
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    // Exactly one stop won; the others were rejected
    assert_eq!(recorder.state(), RecorderState::Stopped);
    assert_eq!(recorder.grabber_stats().frames_failed, 0);
    Ok(())
}

#[test]
fn test_failed_set_up_closes_capture_device() -> Result<()> {
    let dir = TempDir::new()?;

    for breakage in [Breakage::Create, Breakage::AddStream] {
        let (screen, opens, closes) = CountingScreen::new();
        let recorder = ScreenRecorder::screen("screen", screen, Arc::new(BrokenFactory(breakage)));
        recorder.set_output(dir.path().join("screen.broken"))?;

        let err = recorder.set_up().unwrap_err();
        assert_eq!(err.op, Operation::SetUp);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1, "device left open after: {err}");

        drop(recorder);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
    Ok(())
}

#[test]
fn test_drop_after_set_up_closes_capture_device() -> Result<()> {
    let dir = TempDir::new()?;
    let (screen, opens, closes) = CountingScreen::new();
    let recorder = ScreenRecorder::screen("screen", screen, Arc::new(CountingFactory::default()));
    recorder.set_output(dir.path().join("screen.count"))?;

    recorder.set_up()?;
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    drop(recorder);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_repeated_set_up_reopens_capture_device() -> Result<()> {
    let dir = TempDir::new()?;
    let (screen, opens, closes) = CountingScreen::new();
    let recorder = ScreenRecorder::screen("screen", screen, Arc::new(CountingFactory::default()));
    recorder.set_output(dir.path().join("screen.count"))?;

    recorder.set_up()?;
    recorder.set_up()?;
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    recorder.start()?;
    recorder.stop()?;
    assert_eq!(closes.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_state_query_does_not_wait_for_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let recorder = Arc::new(ScreenRecorder::screen(
        "screen",
        TestPatternScreen::new(FrameSize::new(160, 120)),
        Arc::new(SlowCloseFactory(Duration::from_millis(600))),
    ));
    recorder.set_output(dir.path().join("screen.slow"))?;
    recorder.set_frames_per_second(20.0)?;
    recorder.set_up()?;
    recorder.start()?;

    let stopper = {
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || recorder.stop())
    };
    // Let stop reach the encoder close
    thread::sleep(Duration::from_millis(150));

    let before = Instant::now();
    assert!(recorder.is_recording());
    assert!(!recorder.is_stopped());
    assert!(before.elapsed() < Duration::from_millis(100), "{:?}", before.elapsed());

    stopper.join().expect("stop panicked")?;
    assert_eq!(recorder.state(), RecorderState::Stopped);
    Ok(())
}
