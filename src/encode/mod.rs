//! Output encoders
//!
//! Video recorders talk to an `Encoder` (stream setup, per-frame encode with a
//! presentation timestamp, close). Sound recorders write WAV through `WavSink`.

pub mod png_sequence;
pub mod wav;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capture::{FrameSize, RawImage};

pub use png_sequence::{encode_png, IndexEntry, PngSequenceEncoder, PngSequenceFactory};
pub use wav::{WavFile, WavSink, WavSummary};

/// Per-frame storage format of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// Lossless PNG per frame
    #[default]
    Png,
    /// Uncompressed RGB24 per frame
    Raw,
}

/// Encoder/muxer of one output file
pub trait Encoder: Send {
    /// Declares a video stream and returns its index
    fn add_stream(&mut self, codec: VideoCodec, size: FrameSize) -> Result<usize>;

    /// Encodes one frame of `stream` at the given presentation time
    fn encode_frame(&mut self, stream: usize, frame: &RawImage, pts_ms: u64) -> Result<()>;

    /// Flushes and closes the output
    fn close(&mut self) -> Result<()>;
}

/// Creates encoders for output files
pub trait EncoderFactory: Send + Sync {
    /// Extension (no dot) of the files this factory writes
    fn extension(&self) -> &'static str;

    fn create(&self, output: &Path) -> Result<Box<dyn Encoder>>;
}
