use super::config::SessionConfig;
use super::stats::{RecorderStats, SessionStats};
use crate::capture::{FrameSize, RawImage, SineWaveInput, TestPatternCamera, TestPatternScreen};
use crate::config::{Config, PreviewSource};
use crate::encode::EncoderFactory;
use crate::record::{
    ChildOutcome, ErrorKind, HasFrameRate, HasFrequency, HasOutputFile, MultiRecorder, Operation,
    PreviewPoller, Previewable, Recorder, RecorderError, RecorderResult, RecorderState, ScreenRecorder,
    SoundRecorder, WebcamRecorder,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type Screen = ScreenRecorder<TestPatternScreen>;
pub type Webcam = WebcamRecorder<TestPatternCamera>;
pub type Sound = SoundRecorder<SineWaveInput>;

/// The configured recorders combined into one controllable session
pub struct RecordingSession {
    /// Session configuration
    config: SessionConfig,

    /// Composite every control operation goes through
    recorder: Arc<MultiRecorder>,

    screen: Option<Arc<Screen>>,
    webcam: Option<Arc<Webcam>>,
    sound: Option<Arc<Sound>>,

    /// Live preview and the recorder it grabs from, when enabled
    preview: Option<(PreviewPoller, Arc<dyn Previewable>)>,

    started_at: Mutex<Option<DateTime<Utc>>>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
}

impl RecordingSession {
    /// Builds the recorders enabled in `config` over the synthetic backends
    pub fn new(config: &Config, factory: Arc<dyn EncoderFactory>) -> anyhow::Result<Self> {
        let session_config = SessionConfig::from_config(config);
        info!("Creating recording session: {}", session_config.session_id);

        let mut children: Vec<Arc<dyn Recorder>> = Vec::new();

        let screen = if config.screen.enabled {
            let screen = Arc::new(Screen::screen("screen", TestPatternScreen::default(), factory.clone()));
            screen.set_region(config.screen.region())?;
            screen.set_capture_mouse(config.screen.capture_mouse)?;
            screen.set_frames_per_second(config.screen.fps)?;
            screen.set_codec(config.screen.codec)?;
            children.push(screen.clone());
            Some(screen)
        } else {
            None
        };

        let webcam = if config.webcam.enabled {
            let webcam = Arc::new(Webcam::webcam("webcam", TestPatternCamera::default(), factory.clone()));
            webcam.set_device(config.webcam.device.clone())?;
            webcam.set_view_size(FrameSize::new(config.webcam.width, config.webcam.height))?;
            webcam.set_frames_per_second(config.webcam.fps)?;
            webcam.set_codec(config.webcam.codec)?;
            children.push(webcam.clone());
            Some(webcam)
        } else {
            None
        };

        let sound = if config.audio.enabled {
            let sound = Arc::new(Sound::new("sound", SineWaveInput::default()));
            sound.set_frequency(config.audio.frequency)?;
            sound.set_channels(config.audio.channels)?;
            children.push(sound.clone());
            Some(sound)
        } else {
            None
        };

        let preview = if config.preview.enabled {
            let target: Option<Arc<dyn Previewable>> = match config.preview.source {
                PreviewSource::Screen => screen.clone().map(|s| s as Arc<dyn Previewable>),
                PreviewSource::Webcam => webcam.clone().map(|w| w as Arc<dyn Previewable>),
            };
            let target = target.with_context(|| {
                format!("Preview source {:?} is not enabled", config.preview.source)
            })?;
            let poller = PreviewPoller::start(
                target.clone(),
                true,
                Duration::from_millis(config.preview.interval_ms),
            )?;
            Some((poller, target))
        } else {
            None
        };

        let recorder = Arc::new(MultiRecorder::with_policy(
            session_config.session_id.clone(),
            children,
            session_config.start_policy,
        ));

        Ok(Self {
            config: session_config,
            recorder,
            screen,
            webcam,
            sound,
            preview,
            started_at: Mutex::new(None),
            stopped_at: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    pub fn recorder(&self) -> &Arc<MultiRecorder> {
        &self.recorder
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn screen(&self) -> Option<&Arc<Screen>> {
        self.screen.as_ref()
    }

    pub fn webcam(&self) -> Option<&Arc<Webcam>> {
        self.webcam.as_ref()
    }

    pub fn sound(&self) -> Option<&Arc<Sound>> {
        self.sound.as_ref()
    }

    /// Points every recorder at a fresh output file and sets them up
    pub fn set_up(&self) -> RecorderResult<Vec<PathBuf>> {
        let outputs = self.assign_outputs()?;
        self.recorder.set_up()?;
        Ok(outputs)
    }

    /// Sets up and starts every recorder
    pub fn start(&self) -> RecorderResult<Vec<PathBuf>> {
        // A stopped session has to be reset before it can record again
        if self.recorder.state() != RecorderState::Idle {
            return Err(RecorderError::new(self.id(), Operation::Start, ErrorKind::AlreadyStarted));
        }

        let outputs = self.set_up()?;
        self.recorder.start()?;

        *self.started_at.lock() = Some(Utc::now());
        *self.stopped_at.lock() = None;
        info!("Recording session {} started", self.id());
        Ok(outputs)
    }

    pub fn pause(&self) -> Vec<ChildOutcome> {
        self.recorder.pause_all()
    }

    pub fn resume(&self) -> Vec<ChildOutcome> {
        self.recorder.resume_all()
    }

    pub fn stop(&self) -> Vec<ChildOutcome> {
        let outcomes = self.recorder.stop_all();
        if self.started_at.lock().is_some() {
            *self.stopped_at.lock() = Some(Utc::now());
        }
        info!("Recording session {} stopped", self.id());
        outcomes
    }

    /// Returns every recorder to `Idle` for another recording
    pub fn reset(&self) -> RecorderResult<()> {
        self.recorder.reset()?;
        *self.started_at.lock() = None;
        *self.stopped_at.lock() = None;
        Ok(())
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview.is_some()
    }

    /// Newest preview frame, grabbing one on demand if the poller has none yet
    pub fn preview_image(&self) -> Option<RecorderResult<Arc<RawImage>>> {
        let (poller, target) = self.preview.as_ref()?;
        match poller.latest() {
            Some(frame) => Some(Ok(frame.image)),
            None => Some(target.grab_image().map(Arc::new)),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = *self.started_at.lock();
        let end = (*self.stopped_at.lock()).unwrap_or_else(Utc::now);
        let duration_secs = started_at
            .map(|start| end.signed_duration_since(start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let mut recorders = Vec::new();
        if let Some(screen) = &self.screen {
            recorders.push(RecorderStats {
                name: screen.name().to_string(),
                state: screen.state(),
                output: screen.output(),
                frames_encoded: Some(screen.frames_encoded()),
                grabber: Some(screen.grabber_stats()),
                audio: None,
            });
        }
        if let Some(webcam) = &self.webcam {
            recorders.push(RecorderStats {
                name: webcam.name().to_string(),
                state: webcam.state(),
                output: webcam.output(),
                frames_encoded: Some(webcam.frames_encoded()),
                grabber: Some(webcam.grabber_stats()),
                audio: None,
            });
        }
        if let Some(sound) = &self.sound {
            recorders.push(RecorderStats {
                name: sound.name().to_string(),
                state: sound.state(),
                output: sound.output(),
                frames_encoded: None,
                grabber: None,
                audio: sound.summary(),
            });
        }

        SessionStats {
            session_id: self.id().to_string(),
            state: self.recorder.state(),
            is_recording: self.recorder.is_recording(),
            is_paused: self.recorder.is_paused(),
            is_stopped: self.recorder.is_stopped(),
            controls: self.recorder.controls(),
            started_at,
            duration_secs,
            recorders,
        }
    }

    fn assign_outputs(&self) -> RecorderResult<Vec<PathBuf>> {
        let error = |kind| RecorderError::new(self.id(), Operation::SetUp, kind);

        let mut basename = String::new();
        write!(basename, "{}", Utc::now().format(&self.config.basename_pattern)).map_err(|_| {
            error(ErrorKind::InvalidConfig(format!(
                "Invalid file name pattern: {}",
                self.config.basename_pattern
            )))
        })?;

        fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("Failed to create {:?}", self.config.output_dir))
            .map_err(|e| error(ErrorKind::backend("create output directory", e)))?;

        let mut outputs = Vec::new();
        let mut assign = |recorder: &dyn HasOutputFile| -> RecorderResult<()> {
            let file = format!("{}-{}.{}", basename, recorder.name(), recorder.default_extension());
            let path = self.config.output_dir.join(file);
            recorder.set_output(path.clone())?;
            outputs.push(path);
            Ok(())
        };

        if let Some(screen) = &self.screen {
            assign(screen.as_ref())?;
        }
        if let Some(webcam) = &self.webcam {
            assign(webcam.as_ref())?;
        }
        if let Some(sound) = &self.sound {
            assign(sound.as_ref())?;
        }

        Ok(outputs)
    }
}
