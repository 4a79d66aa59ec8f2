use anyhow::{Context, Result};
use hound::{WavReader, WavWriter};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capture::{AudioFormat, AudioFrame};

/// What a finished WAV file contains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavSummary {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of samples written (all channels)
    pub sample_count: usize,
    /// Timestamp of the last frame written, relative to capture start
    pub last_timestamp_ms: u64,
}

impl WavSummary {
    pub fn duration_seconds(&self) -> f64 {
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Writes 16-bit PCM frames to a WAV file
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    summary: WavSummary,
}

impl WavSink {
    pub fn create(path: &Path, format: AudioFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
            summary: WavSummary {
                path: path.to_path_buf(),
                sample_rate: format.sample_rate,
                channels: format.channels,
                sample_count: 0,
                last_timestamp_ms: 0,
            },
        })
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.sample_rate != self.summary.sample_rate || frame.channels != self.summary.channels {
            warn!(
                "Frame format {}Hz/{}ch differs from file format {}Hz/{}ch",
                frame.sample_rate, frame.channels, self.summary.sample_rate, self.summary.channels
            );
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.summary.last_timestamp_ms = frame.timestamp_ms;
            self.summary.sample_count += frame.samples.len();
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<WavSummary> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        info!(
            "WAV file complete: {:?} ({:.1}s, {} samples)",
            self.summary.path,
            self.summary.duration_seconds(),
            self.summary.sample_count
        );

        Ok(self.summary.clone())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// A WAV file read back into memory
pub struct WavFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl WavFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}
