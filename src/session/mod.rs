//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Building the configured screen, webcam and sound recorders
//! - Naming their output files for each recording
//! - Driving them together through one `MultiRecorder`
//! - The optional live preview
//! - Session statistics

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::{RecordingSession, Screen, Sound, Webcam};
pub use stats::{RecorderStats, SessionStats};
