//! Audio line recorder writing 16-bit PCM WAV

use anyhow::Context;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::error::{ErrorKind, RecorderResult};
use super::lifecycle::Lifecycle;
use super::recorder::{HasFrequency, HasOutputFile, Recorder};
use super::state::{Action, RecorderState};
use super::video::validate_output;
use crate::capture::{AudioFormat, AudioFrame, AudioInput};
use crate::encode::{WavSink, WavSummary};

pub const DEFAULT_FREQUENCY: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 2;

#[derive(Debug, Clone)]
struct SoundSettings {
    output: PathBuf,
    frequency: u32,
    channels: u16,
}

/// Records an `AudioInput` into a WAV file
///
/// The line cannot be suspended, so `pause` and `resume` report
/// `ErrorKind::Unsupported` and leave the state alone.
pub struct SoundRecorder<I: AudioInput> {
    lifecycle: Lifecycle,
    settings: Mutex<SoundSettings>,
    input: Mutex<I>,
    opened: Mutex<Option<AudioFormat>>,
    writer: Mutex<Option<JoinHandle<anyhow::Result<WavSummary>>>>,
    summary: Mutex<Option<WavSummary>>,
}

impl<I: AudioInput> SoundRecorder<I> {
    pub fn new(name: impl Into<String>, input: I) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            settings: Mutex::new(SoundSettings {
                output: PathBuf::from("."),
                frequency: DEFAULT_FREQUENCY,
                channels: DEFAULT_CHANNELS,
            }),
            input: Mutex::new(input),
            opened: Mutex::new(None),
            writer: Mutex::new(None),
            summary: Mutex::new(None),
        }
    }

    pub fn channels(&self) -> u16 {
        self.settings.lock().channels
    }

    /// Mono or stereo
    pub fn set_channels(&self, channels: u16) -> RecorderResult<()> {
        self.lifecycle.configure("channels", || {
            validate_channels(channels)?;
            self.settings.lock().channels = channels;
            Ok(())
        })
    }

    /// What the last finished recording wrote
    pub fn summary(&self) -> Option<WavSummary> {
        self.summary.lock().clone()
    }

    fn spawn_writer(
        &self,
        output: &Path,
        format: AudioFormat,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> Result<JoinHandle<anyhow::Result<WavSummary>>, ErrorKind> {
        let sink = WavSink::create(output, format)
            .map_err(|e| ErrorKind::backend("create audio file", e))?;

        let name = self.lifecycle.name().to_string();
        thread::Builder::new()
            .name(format!("wav-{}", name))
            .spawn(move || write_all(&name, sink, frames))
            .context("Failed to spawn audio writer thread")
            .map_err(|e| ErrorKind::backend("start audio writer", e))
    }

    fn finish_writer(&self) -> Result<(), ErrorKind> {
        let Some(handle) = self.writer.lock().take() else {
            return Ok(());
        };

        match handle.join() {
            Ok(Ok(summary)) => {
                *self.summary.lock() = Some(summary);
                Ok(())
            }
            Ok(Err(e)) => Err(ErrorKind::backend("write audio", e)),
            Err(_) => Err(ErrorKind::Backend {
                action: "write audio",
                detail: "writer thread panicked".to_string(),
            }),
        }
    }
}

impl<I: AudioInput> Recorder for SoundRecorder<I> {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn set_up(&self) -> RecorderResult<()> {
        self.lifecycle.set_up(|| {
            let settings = self.settings.lock().clone();
            validate_output(&settings.output)?;
            validate_frequency(settings.frequency)?;
            validate_channels(settings.channels)?;

            let format = AudioFormat {
                sample_rate: settings.frequency,
                channels: settings.channels,
            };
            let mut input = self.input.lock();
            // A repeated setUp reopens the line
            if self.opened.lock().take().is_some() {
                if let Err(e) = input.stop() {
                    warn!("{}: failed to release audio line: {:#}", self.lifecycle.name(), e);
                }
            }
            input
                .open(format)
                .map_err(|e| ErrorKind::backend("open audio line", e))?;
            *self.opened.lock() = Some(format);

            info!(
                "{}: set up {} -> {:?} ({}Hz, {} channels)",
                self.lifecycle.name(),
                input.name(),
                settings.output,
                format.sample_rate,
                format.channels
            );
            Ok(())
        })
    }

    fn start(&self) -> RecorderResult<()> {
        self.lifecycle.start(|| {
            let format = (*self.opened.lock()).ok_or(ErrorKind::NotSetUp)?;
            let output = self.settings.lock().output.clone();

            let frames = self
                .input
                .lock()
                .start()
                .map_err(|e| ErrorKind::backend("start audio line", e))?;

            // From here on a failure must hand the line back
            let handle = match self.spawn_writer(&output, format, frames) {
                Ok(handle) => handle,
                Err(kind) => {
                    if let Err(e) = self.input.lock().stop() {
                        warn!("{}: failed to stop audio line: {:#}", self.lifecycle.name(), e);
                    }
                    *self.opened.lock() = None;
                    return Err(kind);
                }
            };

            *self.summary.lock() = None;
            *self.writer.lock() = Some(handle);
            Ok(())
        })
    }

    fn pause(&self) -> RecorderResult<()> {
        self.lifecycle.unsupported(Action::Pause, "pause audio recording")
    }

    fn resume(&self) -> RecorderResult<()> {
        self.lifecycle.unsupported(Action::Resume, "resume audio recording")
    }

    fn stop(&self) -> RecorderResult<()> {
        self.lifecycle.stop(|| {
            // Stopping the line closes the channel, which ends the writer
            let stopped = self
                .input
                .lock()
                .stop()
                .map_err(|e| ErrorKind::backend("stop audio line", e));
            *self.opened.lock() = None;

            let written = self.finish_writer();
            stopped.and(written)
        })
    }

    fn reset(&self) -> RecorderResult<()> {
        self.lifecycle.reset(|| Ok(()))
    }

    fn state(&self) -> RecorderState {
        self.lifecycle.state()
    }

    fn can_pause_and_resume(&self) -> bool {
        false
    }
}

impl<I: AudioInput> HasOutputFile for SoundRecorder<I> {
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
        "wav"
    }
}

impl<I: AudioInput> HasFrequency for SoundRecorder<I> {
    fn frequency(&self) -> u32 {
        self.settings.lock().frequency
    }

    fn set_frequency(&self, hz: u32) -> RecorderResult<()> {
        self.lifecycle.configure("frequency", || {
            validate_frequency(hz)?;
            self.settings.lock().frequency = hz;
            Ok(())
        })
    }
}

impl<I: AudioInput> Drop for SoundRecorder<I> {
    fn drop(&mut self) {
        let acquired = self.opened.get_mut().take().is_some();
        if acquired || self.lifecycle.state().is_active() {
            if let Err(e) = self.input.get_mut().stop() {
                error!("{}: failed to stop audio line on drop: {:#}", self.lifecycle.name(), e);
            }
            if let Err(kind) = self.finish_writer() {
                error!("{}: {}", self.lifecycle.name(), kind);
            }
        }
    }
}

fn write_all(
    name: &str,
    mut sink: WavSink,
    mut frames: mpsc::Receiver<AudioFrame>,
) -> anyhow::Result<WavSummary> {
    while let Some(frame) = frames.blocking_recv() {
        if let Err(e) = sink.write_frame(&frame) {
            error!("{}: dropping audio: {:#}", name, e);
            // Drain until the line is stopped
            while frames.blocking_recv().is_some() {}
            sink.finish()?;
            return Err(e);
        }
    }
    sink.finish()
}

fn validate_frequency(hz: u32) -> Result<(), ErrorKind> {
    if hz == 0 {
        return Err(ErrorKind::InvalidConfig(
            "Frequency must be > 0, provided: 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_channels(channels: u16) -> Result<(), ErrorKind> {
    if !(1..=2).contains(&channels) {
        return Err(ErrorKind::InvalidConfig(format!(
            "Channels must be 1 or 2, provided: {}",
            channels
        )));
    }
    Ok(())
}
