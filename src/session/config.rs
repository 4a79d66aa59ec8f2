use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;
use crate::record::StartPolicy;

/// Per-session settings derived from the service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-6f1c...")
    pub session_id: String,

    /// Directory every output file is written to
    pub output_dir: PathBuf,

    /// `chrono` format string for the shared file name prefix
    pub basename_pattern: String,

    pub start_policy: StartPolicy,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.recording.output_dir(),
            basename_pattern: config.recording.basename_pattern.clone(),
            start_policy: config.recording.start_policy,
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            output_dir: PathBuf::from("recordings"),
            basename_pattern: "screencast-%Y%m%d-%H%M%S".to_string(),
            start_policy: StartPolicy::FailFast,
        }
    }
}
