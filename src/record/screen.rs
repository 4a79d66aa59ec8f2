use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ErrorKind, RecorderResult};
use super::video::{VideoRecorder, VideoSource};
use crate::capture::{FrameSize, RawImage, Region, ScreenCapture};
use crate::encode::EncoderFactory;

/// Requested capture area in screen coordinates
///
/// A width or height of `-1` stands for "up to the screen edge"; with the
/// defaults the whole screen is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for ScreenRegion {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: -1,
            height: -1,
        }
    }
}

impl ScreenRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Checks the region against the screen and fills in `-1` dimensions
    pub fn resolve(&self, screen: FrameSize) -> Result<Region, ErrorKind> {
        let invalid = |msg: String| Err(ErrorKind::InvalidConfig(msg));

        if self.x < 0 || self.y < 0 {
            return invalid(format!("Screen origin must be >= 0, provided: {},{}", self.x, self.y));
        }
        if self.width == 0 || self.width < -1 {
            return invalid(format!("Width must be -1 or > 0, provided: {}", self.width));
        }
        if self.height == 0 || self.height < -1 {
            return invalid(format!("Height must be -1 or > 0, provided: {}", self.height));
        }

        let (x, y) = (self.x as u32, self.y as u32);
        if x >= screen.width || y >= screen.height {
            return invalid(format!(
                "Origin {},{} is outside of the {}x{} screen",
                x, y, screen.width, screen.height
            ));
        }

        let width = if self.width == -1 { screen.width - x } else { self.width as u32 };
        let height = if self.height == -1 { screen.height - y } else { self.height as u32 };
        if x + width > screen.width || y + height > screen.height {
            return invalid(format!(
                "Region {}x{}+{}+{} exceeds the {}x{} screen",
                width, height, x, y, screen.width, screen.height
            ));
        }

        Ok(Region { x, y, width, height })
    }
}

/// Frames from a region of the screen, optionally with the mouse cursor
pub struct ScreenSource<C: ScreenCapture> {
    backend: C,
    region: ScreenRegion,
    capture_mouse: bool,
    resolved: Option<Region>,
}

impl<C: ScreenCapture> ScreenSource<C> {
    pub fn new(backend: C) -> Self {
        Self {
            backend,
            region: ScreenRegion::default(),
            capture_mouse: true,
            resolved: None,
        }
    }

    fn grab(&mut self, region: Region) -> Result<RawImage> {
        let mut image = self.backend.capture(region)?;
        if self.capture_mouse {
            if let Some(position) = self.backend.cursor_position() {
                draw_cursor(&mut image, region, position);
            }
        }
        Ok(image)
    }
}

impl<C: ScreenCapture> VideoSource for ScreenSource<C> {
    fn describe(&self) -> String {
        match self.resolved {
            Some(r) => format!("{} {}x{}+{}+{}", self.backend.name(), r.width, r.height, r.x, r.y),
            None => self.backend.name().to_string(),
        }
    }

    fn open(&mut self) -> Result<FrameSize, ErrorKind> {
        let screen = self
            .backend
            .screen_size()
            .map_err(|e| ErrorKind::backend("query screen size", e))?;
        let region = self.region.resolve(screen)?;

        self.backend
            .open()
            .map_err(|e| ErrorKind::backend("open screen capture", e))?;
        self.resolved = Some(region);
        Ok(region.size())
    }

    fn capture_frame(&mut self) -> Result<RawImage> {
        let region = self.resolved.context("screen capture is not open")?;
        self.grab(region)
    }

    fn snapshot(&mut self) -> Result<RawImage> {
        if let Some(region) = self.resolved {
            return self.grab(region);
        }

        let screen = self.backend.screen_size()?;
        let region = self.region.resolve(screen)?;
        self.backend.open()?;
        let image = self.grab(region);
        self.backend.close()?;
        image
    }

    fn close(&mut self) -> Result<()> {
        self.resolved = None;
        self.backend.close()
    }
}

/// Records the screen at a fixed frame rate
pub type ScreenRecorder<C> = VideoRecorder<ScreenSource<C>>;

impl<C: ScreenCapture> VideoRecorder<ScreenSource<C>> {
    pub fn screen(name: impl Into<String>, backend: C, factory: Arc<dyn EncoderFactory>) -> Self {
        VideoRecorder::new(name, ScreenSource::new(backend), factory)
    }

    pub fn region(&self) -> ScreenRegion {
        self.with_source(|s| s.region)
    }

    pub fn set_region(&self, region: ScreenRegion) -> RecorderResult<()> {
        self.configure_source("screen region", |s| {
            s.region = region;
            Ok(())
        })
    }

    pub fn capture_mouse(&self) -> bool {
        self.with_source(|s| s.capture_mouse)
    }

    pub fn set_capture_mouse(&self, capture_mouse: bool) -> RecorderResult<()> {
        self.configure_source("mouse capture", |s| {
            s.capture_mouse = capture_mouse;
            Ok(())
        })
    }
}

const CURSOR_HEIGHT: i64 = 16;

/// Paints a white arrow with a black outline, tip at the mouse position
fn draw_cursor(image: &mut RawImage, region: Region, (mx, my): (i32, i32)) {
    let tip_x = mx as i64 - region.x as i64;
    let tip_y = my as i64 - region.y as i64;

    for dy in 0..CURSOR_HEIGHT {
        let width = dy / 2 + 1;
        for dx in 0..width {
            let edge = dx == 0 || dx == width - 1 || dy == CURSOR_HEIGHT - 1;
            let rgb = if edge { [0, 0, 0] } else { [255, 255, 255] };
            image.put_pixel(tip_x + dx, tip_y + dy, rgb);
        }
    }
}
