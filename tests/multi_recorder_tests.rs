// Integration tests for the composite recorder
//
// These tests cover fan-out ordering, the fail-fast and rollback start
// policies, stop reaching every child, tolerated "unsupported" answers, and
// a full screen + webcam + audio session.

use anyhow::Result;
use screencast::capture::{FrameSize, SineWaveInput, TestPatternCamera, TestPatternScreen};
use screencast::encode::{Encoder, EncoderFactory, VideoCodec, WavFile};
use screencast::record::{
    ErrorKind, HasFrameRate, HasFrequency, HasOutputFile, Lifecycle, MultiRecorder, Recorder,
    RecorderResult, RecorderState, ScreenRecorder, ScreenRegion, SoundRecorder, StartPolicy,
    WebcamRecorder,
};
use screencast::RawImage;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Recorder whose hooks can be told to fail, logging every call
struct Scripted {
    lifecycle: Lifecycle,
    fail_start: bool,
    fail_stop: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl Scripted {
    fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            fail_start: false,
            fail_stop: false,
            log: Arc::clone(log),
        }
    }

    fn record(&self, op: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.lifecycle.name(), op));
    }
}

impl Recorder for Scripted {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn set_up(&self) -> RecorderResult<()> {
        self.record("set_up");
        self.lifecycle.set_up(|| Ok(()))
    }

    fn start(&self) -> RecorderResult<()> {
        self.record("start");
        self.lifecycle.start(|| {
            if self.fail_start {
                Err(ErrorKind::backend("open device", anyhow::anyhow!("device busy")))
            } else {
                Ok(())
            }
        })
    }

    fn pause(&self) -> RecorderResult<()> {
        self.record("pause");
        self.lifecycle.pause(|| Ok(()))
    }

    fn resume(&self) -> RecorderResult<()> {
        self.record("resume");
        self.lifecycle.resume(|| Ok(()))
    }

    fn stop(&self) -> RecorderResult<()> {
        self.record("stop");
        self.lifecycle.stop(|| {
            if self.fail_stop {
                Err(ErrorKind::backend("close encoder", anyhow::anyhow!("disk full")))
            } else {
                Ok(())
            }
        })
    }

    fn reset(&self) -> RecorderResult<()> {
        self.record("reset");
        self.lifecycle.reset(|| Ok(()))
    }

    fn state(&self) -> RecorderState {
        self.lifecycle.state()
    }
}

/// Encoder remembering when each frame arrived
#[derive(Default)]
struct CountingFactory {
    encodes: Arc<Mutex<Vec<Instant>>>,
    created: AtomicUsize,
}

struct CountingEncoder {
    encodes: Arc<Mutex<Vec<Instant>>>,
}

impl EncoderFactory for CountingFactory {
    fn extension(&self) -> &'static str {
        "count"
    }

    fn create(&self, _output: &Path) -> anyhow::Result<Box<dyn Encoder>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEncoder {
            encodes: Arc::clone(&self.encodes),
        }))
    }
}

impl Encoder for CountingEncoder {
    fn add_stream(&mut self, _codec: VideoCodec, _size: FrameSize) -> anyhow::Result<usize> {
        Ok(0)
    }

    fn encode_frame(&mut self, _stream: usize, _frame: &RawImage, _pts_ms: u64) -> anyhow::Result<()> {
        self.encodes.lock().unwrap().push(Instant::now());
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_children_are_driven_in_order() -> Result<()> {
    let log = log();
    let multi = MultiRecorder::new(
        "multi",
        vec![
            Arc::new(Scripted::new("a", &log)),
            Arc::new(Scripted::new("b", &log)),
        ],
    );

    multi.set_up()?;
    multi.start()?;
    multi.stop()?;

    assert_eq!(
        entries(&log),
        ["a:set_up", "b:set_up", "a:start", "b:start", "a:stop", "b:stop"]
    );
    assert_eq!(multi.state(), RecorderState::Stopped);
    Ok(())
}

#[test]
fn test_fail_fast_leaves_partial_start() {
    let log = log();
    let mut failing = Scripted::new("b", &log);
    failing.fail_start = true;

    let first = Arc::new(Scripted::new("a", &log));
    let multi = MultiRecorder::new(
        "multi",
        vec![
            first.clone(),
            Arc::new(failing),
            Arc::new(Scripted::new("c", &log)),
        ],
    );

    let err = multi.start().unwrap_err();
    assert_eq!(err.recorder, "b");
    assert!(err.to_string().contains("device busy"));

    // "c" was never started, "a" keeps recording
    assert!(!entries(&log).contains(&"c:start".to_string()));
    assert_eq!(first.state(), RecorderState::Recording);
    assert!(multi.is_recording());
    assert_eq!(multi.state(), RecorderState::Recording);

    let controls = multi.controls();
    assert!(controls.stop && !controls.record);
}

#[test]
fn test_rollback_returns_started_children_to_idle() {
    let log = log();
    let mut failing = Scripted::new("b", &log);
    failing.fail_start = true;

    let first = Arc::new(Scripted::new("a", &log));
    let multi = MultiRecorder::with_policy(
        "multi",
        vec![first.clone(), Arc::new(failing)],
        StartPolicy::Rollback,
    );

    assert!(multi.start().is_err());
    assert_eq!(first.state(), RecorderState::Idle);
    assert!(!multi.is_recording());
    assert_eq!(multi.state(), RecorderState::Idle);
    assert!(entries(&log).ends_with(&["a:stop".to_string(), "a:reset".to_string()]));
}

#[test]
fn test_start_rejected_while_any_child_active() -> Result<()> {
    let log = log();
    let a = Arc::new(Scripted::new("a", &log));
    let multi = MultiRecorder::new("multi", vec![a.clone(), Arc::new(Scripted::new("b", &log))]);

    a.start()?;
    let err = multi.start().unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyStarted);
    assert_eq!(err.recorder, "multi");
    Ok(())
}

#[test]
fn test_stop_reaches_every_child() -> Result<()> {
    let log = log();
    let mut failing = Scripted::new("a", &log);
    failing.fail_stop = true;

    let last = Arc::new(Scripted::new("b", &log));
    let multi = MultiRecorder::new("multi", vec![Arc::new(failing), last.clone()]);
    multi.start()?;

    let err = multi.stop().unwrap_err();
    assert_eq!(err.recorder, "a");
    assert!(entries(&log).contains(&"b:stop".to_string()));
    assert_eq!(last.state(), RecorderState::Stopped);
    assert!(multi.is_stopped());
    Ok(())
}

#[test]
fn test_empty_composite_cannot_start() {
    let multi = MultiRecorder::new("multi", Vec::new());
    assert!(multi.set_up().unwrap_err().kind.is_config());
    assert!(multi.start().unwrap_err().kind.is_config());
    assert_eq!(multi.state(), RecorderState::Idle);
}

#[test]
fn test_recorders_locked_while_recording() -> Result<()> {
    let log = log();
    let multi = MultiRecorder::new("multi", vec![Arc::new(Scripted::new("a", &log))]);
    multi.start()?;

    let err = multi
        .set_recorders(vec![Arc::new(Scripted::new("b", &log))])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigLocked("recorders"));
    assert_eq!(multi.recorders().len(), 1);
    Ok(())
}

#[test]
fn test_unsupported_pause_is_tolerated() -> Result<()> {
    let dir = TempDir::new()?;
    let log = log();

    let sound = Arc::new(SoundRecorder::new("sound", SineWaveInput::default()));
    sound.set_output(dir.path().join("sound.wav"))?;
    let video = Arc::new(Scripted::new("video", &log));

    let multi = MultiRecorder::new("multi", vec![video.clone(), sound.clone()]);
    assert!(multi.can_pause_and_resume());

    multi.set_up()?;
    multi.start()?;

    let outcomes = multi.pause_all();
    assert!(outcomes[0].is_ok());
    let sound_error = outcomes[1].error.as_ref().expect("sound cannot pause");
    assert!(sound_error.is_unsupported());

    // The folded answer treats "cannot pause audio" as non-fatal
    multi.resume()?;
    multi.pause()?;

    assert_eq!(video.state(), RecorderState::Paused);
    assert_eq!(sound.state(), RecorderState::Recording);
    assert!(multi.is_paused() && multi.is_recording());

    multi.stop()?;
    assert!(sound.is_stopped() && video.is_stopped());
    Ok(())
}

#[test]
fn test_pause_reported_when_no_child_can_pause() -> Result<()> {
    let dir = TempDir::new()?;
    let sound = Arc::new(SoundRecorder::new("sound", SineWaveInput::default()));
    sound.set_output(dir.path().join("sound.wav"))?;

    let multi = MultiRecorder::new("multi", vec![sound.clone()]);
    assert!(!multi.can_pause_and_resume());
    multi.set_up()?;
    multi.start()?;

    let err = multi.pause().unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.recorder, "sound");
    assert!(multi.resume().unwrap_err().is_unsupported());

    assert_eq!(multi.state(), RecorderState::Recording);
    assert!(!multi.is_paused());

    multi.stop()?;
    assert!(sound.is_stopped());
    Ok(())
}

#[test]
fn test_screen_webcam_and_audio_session() -> Result<()> {
    let dir = TempDir::new()?;

    let screen_factory = Arc::new(CountingFactory::default());
    let screen_encodes = Arc::clone(&screen_factory.encodes);
    let screen = Arc::new(ScreenRecorder::screen(
        "screen",
        TestPatternScreen::new(FrameSize::new(1024, 768)),
        screen_factory.clone(),
    ));
    screen.set_output(dir.path().join("screen.count"))?;
    screen.set_region(ScreenRegion::new(0, 0, 800, 600))?;
    screen.set_frames_per_second(10.0)?;

    let webcam_factory = Arc::new(CountingFactory::default());
    let webcam_encodes = Arc::clone(&webcam_factory.encodes);
    let webcam = Arc::new(WebcamRecorder::webcam(
        "webcam",
        TestPatternCamera::default(),
        webcam_factory.clone(),
    ));
    webcam.set_output(dir.path().join("webcam.count"))?;
    webcam.set_view_size(FrameSize::new(320, 240))?;
    webcam.set_frames_per_second(25.0)?;

    let sound = Arc::new(SoundRecorder::new("sound", SineWaveInput::default()));
    sound.set_output(dir.path().join("sound.wav"))?;
    sound.set_frequency(44_100)?;

    let multi = MultiRecorder::new(
        "session",
        vec![sound.clone(), webcam.clone(), screen.clone()],
    );

    multi.set_up()?;
    assert_eq!(screen_factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(webcam_factory.created.load(Ordering::SeqCst), 1);

    let outer = Instant::now();
    multi.start()?;
    let inner = Instant::now();
    thread::sleep(Duration::from_secs(2));
    let inner = inner.elapsed();
    multi.stop()?;
    let outer = outer.elapsed();

    for child in multi.recorders() {
        assert_eq!(child.state(), RecorderState::Stopped, "{}", child.name());
    }

    // Every child got about session_duration * fps frames, within one frame
    let check = |name: &str, encodes: &Arc<Mutex<Vec<Instant>>>, fps: f64| {
        let stamps = encodes.lock().unwrap().clone();
        assert!(stamps.len() >= 2, "{}: {} frames", name, stamps.len());
        let frames = stamps.len() as f64;

        let low = (inner.as_secs_f64() * fps).floor() - 1.0;
        let high = (outer.as_secs_f64() * fps).ceil() + 1.0;
        assert!(
            frames >= low && frames <= high,
            "{}: {} frames, expected {}..={}",
            name,
            frames,
            low,
            high
        );

        // The cadence between first and last frame matches the frame rate
        let span = (*stamps.last().unwrap() - stamps[0]).as_secs_f64();
        let intervals = frames - 1.0;
        assert!(
            (intervals - span * fps).abs() <= 1.0,
            "{}: {} intervals over {:.3}s at {} fps",
            name,
            intervals,
            span,
            fps
        );
    };
    check("screen", &screen_encodes, 10.0);
    check("webcam", &webcam_encodes, 25.0);
    assert_eq!(screen.grabber_stats().frames_failed, 0);

    let audio = WavFile::open(dir.path().join("sound.wav"))?;
    assert_eq!(audio.sample_rate, 44_100);
    assert_eq!(audio.channels, 2);
    assert!(audio.duration_seconds > 1.5, "{}s of audio", audio.duration_seconds);
    Ok(())
}
