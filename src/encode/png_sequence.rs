use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Encoder, EncoderFactory, VideoCodec};
use crate::capture::{FrameSize, RawImage};

/// One line of the JSON-lines index written to the output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexEntry {
    Stream {
        index: usize,
        codec: VideoCodec,
        width: u32,
        height: u32,
    },
    Frame {
        stream: usize,
        sequence: u64,
        pts_ms: u64,
        /// Frame file, relative to the index file's directory
        file: String,
    },
}

#[derive(Debug)]
struct StreamState {
    codec: VideoCodec,
    size: FrameSize,
    frames: u64,
}

/// Writes every frame as its own file next to a JSON-lines index
///
/// For an output `screen.jsonl` the frames go to `screen_frames/` and the
/// index lists streams and frames with their presentation timestamps.
pub struct PngSequenceEncoder {
    index_path: PathBuf,
    frames_dir: PathBuf,
    frames_dir_name: String,
    index: Option<BufWriter<File>>,
    streams: Vec<StreamState>,
}

impl PngSequenceEncoder {
    pub const EXTENSION: &'static str = "jsonl";

    pub fn create(output: &Path) -> Result<Self> {
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .with_context(|| format!("Output has no file name: {:?}", output))?;
        let frames_dir_name = format!("{}_frames", stem);
        let frames_dir = output
            .parent()
            .map(|p| p.join(&frames_dir_name))
            .unwrap_or_else(|| PathBuf::from(&frames_dir_name));

        fs::create_dir_all(&frames_dir)
            .with_context(|| format!("Failed to create frame directory: {:?}", frames_dir))?;
        let index = File::create(output)
            .with_context(|| format!("Failed to create index file: {:?}", output))?;

        info!("PNG sequence encoder writing to {:?}", output);

        Ok(Self {
            index_path: output.to_path_buf(),
            frames_dir,
            frames_dir_name,
            index: Some(BufWriter::new(index)),
            streams: Vec::new(),
        })
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    /// Reads back an index written by this encoder
    pub fn read_index(path: &Path) -> Result<Vec<IndexEntry>> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index file: {:?}", path))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Malformed index line"))
            .collect()
    }

    fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        let index = self.index.as_mut().context("Encoder already closed")?;
        serde_json::to_writer(&mut *index, entry).context("Failed to write index entry")?;
        index.write_all(b"\n").context("Failed to write index entry")?;
        Ok(())
    }
}

impl Encoder for PngSequenceEncoder {
    fn add_stream(&mut self, codec: VideoCodec, size: FrameSize) -> Result<usize> {
        if size.width == 0 || size.height == 0 {
            bail!("Invalid stream size {}x{}", size.width, size.height);
        }

        let index = self.streams.len();
        self.append(&IndexEntry::Stream {
            index,
            codec,
            width: size.width,
            height: size.height,
        })?;
        self.streams.push(StreamState {
            codec,
            size,
            frames: 0,
        });

        Ok(index)
    }

    fn encode_frame(&mut self, stream: usize, frame: &RawImage, pts_ms: u64) -> Result<()> {
        let (codec, size, sequence) = match self.streams.get(stream) {
            Some(s) => (s.codec, s.size, s.frames),
            None => bail!("Unknown stream {}", stream),
        };
        if frame.size() != size {
            bail!(
                "Frame is {}x{}, stream {} expects {}x{}",
                frame.width,
                frame.height,
                stream,
                size.width,
                size.height
            );
        }

        let file_name = match codec {
            VideoCodec::Png => format!("s{}-{:06}.png", stream, sequence),
            VideoCodec::Raw => format!("s{}-{:06}.rgb", stream, sequence),
        };
        let path = self.frames_dir.join(&file_name);

        match codec {
            VideoCodec::Png => write_png(&path, frame)?,
            VideoCodec::Raw => fs::write(&path, &frame.data)
                .with_context(|| format!("Failed to write frame: {:?}", path))?,
        }

        self.append(&IndexEntry::Frame {
            stream,
            sequence,
            pts_ms,
            file: format!("{}/{}", self.frames_dir_name, file_name),
        })?;
        self.streams[stream].frames += 1;

        debug!("Encoded frame {} of stream {} at {}ms", sequence, stream, pts_ms);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut index) = self.index.take() {
            index.flush().context("Failed to flush index file")?;
            let frames: u64 = self.streams.iter().map(|s| s.frames).sum();
            info!("Closed {:?} ({} frames)", self.index_path, frames);
        }
        Ok(())
    }
}

impl Drop for PngSequenceEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close encoder on drop: {}", e);
        }
    }
}

fn write_png(path: &Path, frame: &RawImage) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create frame: {:?}", path))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast);

    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(&frame.data)
        .context("Failed to write PNG data")?;
    writer.finish().context("Failed to finish PNG")?;
    Ok(())
}

/// Encodes a single image as PNG into memory
pub fn encode_png(frame: &RawImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().context("Failed to write PNG header")?;
        writer
            .write_image_data(&frame.data)
            .context("Failed to write PNG data")?;
        writer.finish().context("Failed to finish PNG")?;
    }
    Ok(bytes)
}

/// Factory for `PngSequenceEncoder`
#[derive(Debug, Clone, Copy, Default)]
pub struct PngSequenceFactory;

impl EncoderFactory for PngSequenceFactory {
    fn extension(&self) -> &'static str {
        PngSequenceEncoder::EXTENSION
    }

    fn create(&self, output: &Path) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(PngSequenceEncoder::create(output)?))
    }
}
