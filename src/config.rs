use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::encode::VideoCodec;
use crate::record::{ScreenRegion, StartPolicy};

/// Default location of the optional config file (extension picked by `config`)
pub const DEFAULT_CONFIG_PATH: &str = "config/screencast";

/// Environment variables override the file, e.g. `SCREENCAST_SCREEN__FPS=10`
pub const ENV_PREFIX: &str = "SCREENCAST";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    pub screen: ScreenConfig,
    pub webcam: WebcamConfig,
    pub audio: AudioConfig,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "screencast".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory receiving every output file; `~` is expanded
    pub output_dir: String,
    /// `chrono` format string for the shared part of the output file names
    pub basename_pattern: String,
    pub start_policy: StartPolicy,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: "recordings".to_string(),
            basename_pattern: "screencast-%Y%m%d-%H%M%S".to_string(),
            start_policy: StartPolicy::default(),
        }
    }
}

impl RecordingConfig {
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub enabled: bool,
    pub x: i32,
    pub y: i32,
    /// `-1` records up to the right screen edge
    pub width: i32,
    /// `-1` records up to the bottom screen edge
    pub height: i32,
    pub fps: f64,
    pub capture_mouse: bool,
    pub codec: VideoCodec,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        let region = ScreenRegion::default();
        Self {
            enabled: true,
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            fps: 25.0,
            capture_mouse: true,
            codec: VideoCodec::default(),
        }
    }
}

impl ScreenConfig {
    pub fn region(&self) -> ScreenRegion {
        ScreenRegion::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    pub enabled: bool,
    /// Camera name; empty selects the default camera
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: VideoCodec,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: String::new(),
            width: 320,
            height: 240,
            fps: 25.0,
            codec: VideoCodec::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub frequency: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: 44_100,
            channels: 2,
        }
    }
}

/// Recorder the preview is grabbed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSource {
    #[default]
    Screen,
    Webcam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub source: PreviewSource,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 500,
            source: PreviewSource::default(),
        }
    }
}

impl Config {
    /// Loads `path` (if present) and applies `SCREENCAST_*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
