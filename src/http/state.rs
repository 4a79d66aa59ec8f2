use crate::session::RecordingSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The session every request controls
    pub session: Arc<RecordingSession>,
}

impl AppState {
    pub fn new(session: RecordingSession) -> Self {
        Self {
            session: Arc::new(session),
        }
    }
}
