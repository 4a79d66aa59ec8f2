use serde::{Deserialize, Serialize};

/// Width and height of a frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A resolved rectangle on screen (origin top-left, 0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// Uncompressed frame, 8-bit RGB, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawImage {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn filled(size: FrameSize, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(size.pixel_count() * Self::BYTES_PER_PIXEL);
        for _ in 0..size.pixel_count() {
            data.extend_from_slice(&rgb);
        }

        Self {
            width: size.width,
            height: size.height,
            data,
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Sets a pixel; coordinates outside the image are ignored
    pub fn put_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(offset) = self.offset(x as u32, y as u32) {
            self.data[offset..offset + 3].copy_from_slice(&rgb);
        }
    }

    /// Nearest-neighbour rescale, used when a device delivers another size
    pub fn resized(&self, size: FrameSize) -> RawImage {
        if size == self.size() {
            return self.clone();
        }

        let mut out = Vec::with_capacity(size.pixel_count() * Self::BYTES_PER_PIXEL);
        for y in 0..size.height {
            let src_y = (y as u64 * self.height as u64 / size.height.max(1) as u64) as u32;
            for x in 0..size.width {
                let src_x = (x as u64 * self.width as u64 / size.width.max(1) as u64) as u32;
                let pixel = self.pixel(src_x, src_y).unwrap_or([0, 0, 0]);
                out.extend_from_slice(&pixel);
            }
        }

        RawImage {
            width: size.width,
            height: size.height,
            data: out,
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL)
    }
}

/// PCM format requested from an audio input (always 16-bit signed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}
