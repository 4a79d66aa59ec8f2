// Synthetic capture backends
//
// Deterministic stand-ins for the platform screen grabber, webcam driver and
// audio line. The CLI and the HTTP server use them out of the box, tests use
// them to exercise recorders without hardware.

use anyhow::{bail, Context, Result};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{AudioInput, CameraDevice, ScreenCapture};
use super::frame::{AudioFormat, AudioFrame, FrameSize, RawImage, Region};

/// Moving test pattern standing in for a real screen
pub struct TestPatternScreen {
    size: FrameSize,
    epoch: Instant,
    open: bool,
}

impl TestPatternScreen {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            epoch: Instant::now(),
            open: false,
        }
    }
}

impl Default for TestPatternScreen {
    fn default() -> Self {
        Self::new(FrameSize::new(1280, 720))
    }
}

impl ScreenCapture for TestPatternScreen {
    fn name(&self) -> &str {
        "test pattern screen"
    }

    fn screen_size(&self) -> Result<FrameSize> {
        Ok(self.size)
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn capture(&mut self, region: Region) -> Result<RawImage> {
        if !self.open {
            bail!("screen capture is not open");
        }
        if region.x + region.width > self.size.width || region.y + region.height > self.size.height {
            bail!(
                "region {}x{}+{}+{} outside of {}x{} screen",
                region.width,
                region.height,
                region.x,
                region.y,
                self.size.width,
                self.size.height
            );
        }

        let phase = (self.epoch.elapsed().as_millis() / 10) as u32;
        Ok(pattern(region.size(), region.x + phase, region.y))
    }

    fn cursor_position(&self) -> Option<(i32, i32)> {
        // Cursor circles around the screen centre
        let t = self.epoch.elapsed().as_secs_f32();
        let cx = self.size.width as f32 / 2.0 + (t.cos() * self.size.width as f32 / 4.0);
        let cy = self.size.height as f32 / 2.0 + (t.sin() * self.size.height as f32 / 4.0);
        Some((cx as i32, cy as i32))
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// Fake webcam driver exposing a fixed list of named cameras
pub struct TestPatternCamera {
    devices: Vec<String>,
    opened: Option<(String, FrameSize)>,
    frame_no: u32,
}

impl TestPatternCamera {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            opened: None,
            frame_no: 0,
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new(vec!["Test Camera".to_string()])
    }
}

impl CameraDevice for TestPatternCamera {
    fn name(&self) -> &str {
        "test pattern camera"
    }

    fn devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }

    fn open(&mut self, device: &str, size: FrameSize) -> Result<()> {
        if !self.devices.iter().any(|d| d == device) {
            bail!("no such camera: {}", device);
        }
        info!("Opened camera '{}' at {}x{}", device, size.width, size.height);
        self.opened = Some((device.to_string(), size));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    fn capture(&mut self) -> Result<RawImage> {
        let (_, size) = self.opened.as_ref().context("camera is not open")?;
        self.frame_no = self.frame_no.wrapping_add(1);
        Ok(pattern(*size, self.frame_no * 4, self.frame_no))
    }

    fn close(&mut self) -> Result<()> {
        if let Some((device, _)) = self.opened.take() {
            debug!("Closed camera '{}'", device);
        }
        Ok(())
    }
}

/// Audio line producing a sine tone in real time
pub struct SineWaveInput {
    tone_hz: f32,
    format: Option<AudioFormat>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SineWaveInput {
    /// Length of each delivered buffer
    pub const BUFFER: Duration = Duration::from_millis(20);

    pub fn new(tone_hz: f32) -> Self {
        Self {
            tone_hz,
            format: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for SineWaveInput {
    fn default() -> Self {
        Self::new(440.0)
    }
}

impl AudioInput for SineWaveInput {
    fn name(&self) -> &str {
        "sine wave"
    }

    fn open(&mut self, format: AudioFormat) -> Result<()> {
        if format.sample_rate == 0 || format.channels == 0 {
            bail!("unsupported format: {:?}", format);
        }
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            bail!("Already capturing");
        }
        let format = self.format.context("audio line is not open")?;

        let (tx, rx) = mpsc::channel(64);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let tone_hz = self.tone_hz;
        let handle = thread::Builder::new()
            .name("sine-wave".to_string())
            .spawn(move || generate(format, tone_hz, running, tx))
            .context("Failed to spawn sine wave thread")?;

        self.worker = Some(handle);
        info!(
            "Sine wave capture started ({}Hz, {} channels)",
            format.sample_rate, format.channels
        );

        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                bail!("sine wave thread panicked");
            }
        }
        self.format = None;
        Ok(())
    }
}

fn generate(format: AudioFormat, tone_hz: f32, running: Arc<AtomicBool>, tx: mpsc::Sender<AudioFrame>) {
    let frames_per_buffer =
        (format.sample_rate as u64 * SineWaveInput::BUFFER.as_millis() as u64 / 1000) as usize;
    let start = Instant::now();
    let mut position: u64 = 0;
    let mut buffers: u32 = 0;

    while running.load(Ordering::SeqCst) {
        let mut samples = Vec::with_capacity(frames_per_buffer * format.channels as usize);
        for i in 0..frames_per_buffer {
            let t = (position + i as u64) as f32 / format.sample_rate as f32;
            let value = ((2.0 * PI * tone_hz * t).sin() * i16::MAX as f32 * 0.25) as i16;
            for _ in 0..format.channels {
                samples.push(value);
            }
        }

        let frame = AudioFrame {
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
            timestamp_ms: position * 1000 / format.sample_rate as u64,
        };
        position += frames_per_buffer as u64;
        buffers += 1;

        if tx.blocking_send(frame).is_err() {
            break;
        }

        // Deliver in real time
        let due = start + SineWaveInput::BUFFER * buffers;
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
}

/// Diagonal colour bands, shifted by the given offsets
fn pattern(size: FrameSize, shift_x: u32, shift_y: u32) -> RawImage {
    let mut data = Vec::with_capacity(size.pixel_count() * RawImage::BYTES_PER_PIXEL);
    for y in 0..size.height {
        for x in 0..size.width {
            let band = ((x + shift_x + y + shift_y) / 32) % 6;
            let rgb = match band {
                0 => [220, 60, 60],
                1 => [220, 160, 60],
                2 => [200, 200, 70],
                3 => [70, 180, 90],
                4 => [60, 110, 210],
                _ => [130, 80, 190],
            };
            data.extend_from_slice(&rgb);
        }
    }

    RawImage {
        width: size.width,
        height: size.height,
        data,
    }
}
