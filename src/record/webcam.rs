use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use super::error::{ErrorKind, RecorderResult};
use super::video::{VideoRecorder, VideoSource};
use crate::capture::{CameraDevice, FrameSize, RawImage};
use crate::encode::EncoderFactory;

pub const DEFAULT_VIEW_SIZE: FrameSize = FrameSize {
    width: 320,
    height: 240,
};

/// Frames from a webcam; an empty device ID selects the default camera
pub struct WebcamSource<D: CameraDevice> {
    device: D,
    device_id: String,
    size: FrameSize,
    opened: Option<String>,
}

impl<D: CameraDevice> WebcamSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            device_id: String::new(),
            size: DEFAULT_VIEW_SIZE,
            opened: None,
        }
    }

    /// Resolves the configured ID to an attached camera
    fn find_device(&self) -> Result<String, ErrorKind> {
        let devices = self
            .device
            .devices()
            .map_err(|e| ErrorKind::backend("list webcams", e))?;

        let found = if self.device_id.is_empty() {
            devices.into_iter().next()
        } else {
            devices.into_iter().find(|d| *d == self.device_id)
        };

        found.ok_or_else(|| {
            let id = if self.device_id.is_empty() {
                "-default-"
            } else {
                self.device_id.as_str()
            };
            ErrorKind::InvalidConfig(format!("No webcam found for ID: {}", id))
        })
    }

    fn grab(&mut self) -> Result<RawImage> {
        let image = self.device.capture()?;
        if image.size() != self.size {
            debug!(
                "Scaling webcam frame {}x{} to {}x{}",
                image.width, image.height, self.size.width, self.size.height
            );
            return Ok(image.resized(self.size));
        }
        Ok(image)
    }
}

impl<D: CameraDevice> VideoSource for WebcamSource<D> {
    fn describe(&self) -> String {
        let id = self.opened.as_deref().unwrap_or(self.device_id.as_str());
        format!("webcam '{}' {}x{}", id, self.size.width, self.size.height)
    }

    fn open(&mut self) -> Result<FrameSize, ErrorKind> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(ErrorKind::InvalidConfig(format!(
                "Invalid webcam view size {}x{}",
                self.size.width, self.size.height
            )));
        }

        let device = self.find_device()?;
        self.device
            .open(&device, self.size)
            .map_err(|e| ErrorKind::backend("open webcam", e))?;
        self.opened = Some(device);
        Ok(self.size)
    }

    fn capture_frame(&mut self) -> Result<RawImage> {
        if self.opened.is_none() {
            anyhow::bail!("webcam is not open");
        }
        self.grab()
    }

    fn snapshot(&mut self) -> Result<RawImage> {
        if self.opened.is_some() {
            return self.grab();
        }

        let device = self.find_device()?;
        self.device
            .open(&device, self.size)
            .with_context(|| format!("Failed to open webcam '{}'", device))?;
        let image = self.grab();
        self.device.close()?;
        image
    }

    fn close(&mut self) -> Result<()> {
        self.opened = None;
        if self.device.is_open() {
            self.device.close()?;
        }
        Ok(())
    }
}

/// Records a webcam at a fixed frame rate
pub type WebcamRecorder<D> = VideoRecorder<WebcamSource<D>>;

impl<D: CameraDevice> VideoRecorder<WebcamSource<D>> {
    pub fn webcam(name: impl Into<String>, device: D, factory: Arc<dyn EncoderFactory>) -> Self {
        VideoRecorder::new(name, WebcamSource::new(device), factory)
    }

    pub fn device_id(&self) -> String {
        self.with_source(|s| s.device_id.clone())
    }

    /// Selects the camera by name; empty selects the default one
    pub fn set_device(&self, device_id: impl Into<String>) -> RecorderResult<()> {
        let device_id = device_id.into();
        self.configure_source("webcam device", |s| {
            s.device_id = device_id;
            Ok(())
        })
    }

    pub fn view_size(&self) -> FrameSize {
        self.with_source(|s| s.size)
    }

    pub fn set_view_size(&self, size: FrameSize) -> RecorderResult<()> {
        self.configure_source("webcam view size", |s| {
            if size.width == 0 || size.height == 0 {
                return Err(ErrorKind::InvalidConfig(format!(
                    "Invalid webcam view size {}x{}",
                    size.width, size.height
                )));
            }
            s.size = size;
            Ok(())
        })
    }
}
