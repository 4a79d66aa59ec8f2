use super::state::AppState;
use crate::encode::encode_png;
use crate::record::{ChildOutcome, ErrorKind, RecorderError, RecorderState};
use crate::session::{RecordingSession, SessionStats};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub state: RecorderState,
    pub outputs: Vec<PathBuf>,
}

/// Result of pause, resume and stop: every child is reported
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub state: RecorderState,
    pub outcomes: Vec<ChildOutcome>,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub outcomes: Vec<ChildOutcome>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<ChildOutcome>>,
}

/// HTTP status for a recorder error
pub fn status_for(err: &RecorderError) -> StatusCode {
    match &err.kind {
        kind if kind.is_rejection() => StatusCode::CONFLICT,
        kind if kind.is_config() => StatusCode::BAD_REQUEST,
        ErrorKind::Unsupported(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &RecorderError, outcomes: Option<Vec<ChildOutcome>>) -> Response {
    (
        status_for(err),
        Json(ErrorResponse {
            error: err.to_string(),
            outcomes,
        }),
    )
        .into_response()
}

/// Runs recorder calls off the async workers; they may join capture threads
async fn blocking<T, F>(session: &Arc<RecordingSession>, f: F) -> Result<T, Response>
where
    F: FnOnce(&RecordingSession) -> T + Send + 'static,
    T: Send + 'static,
{
    let session = Arc::clone(session);
    tokio::task::spawn_blocking(move || f(&session))
        .await
        .map_err(|e| {
            error!("Recorder task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Recorder task failed: {}", e),
                    outcomes: None,
                }),
            )
                .into_response()
        })
}

/// Pause and resume tolerate children that cannot suspend
fn control_response(state: RecorderState, outcomes: Vec<ChildOutcome>) -> Response {
    let failure = outcomes
        .iter()
        .filter_map(|o| o.error.as_ref())
        .find(|e| !e.is_unsupported())
        .cloned();

    match failure {
        Some(err) => error_response(&err, Some(outcomes)),
        None => (StatusCode::OK, Json(ControlResponse { state, outcomes })).into_response(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> Response {
    match blocking(&state.session, |s| s.stats()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(response) => response,
    }
}

/// POST /recording/start
/// Set up and start every configured recorder
pub async fn start_recording(State(state): State<AppState>) -> Response {
    info!("Starting recording session {}", state.session.id());

    let result = match blocking(&state.session, |s| s.start().map(|o| (o, s.recorder_state()))).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    match result {
        Ok((outputs, recorder_state)) => (
            StatusCode::OK,
            Json(StartRecordingResponse {
                session_id: state.session.id().to_string(),
                state: recorder_state,
                outputs,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            error_response(&e, None)
        }
    }
}

/// POST /recording/pause
pub async fn pause_recording(State(state): State<AppState>) -> Response {
    match blocking(&state.session, |s| (s.pause(), s.recorder_state())).await {
        Ok((outcomes, recorder_state)) => control_response(recorder_state, outcomes),
        Err(response) => response,
    }
}

/// POST /recording/resume
pub async fn resume_recording(State(state): State<AppState>) -> Response {
    match blocking(&state.session, |s| (s.resume(), s.recorder_state())).await {
        Ok((outcomes, recorder_state)) => control_response(recorder_state, outcomes),
        Err(response) => response,
    }
}

/// POST /recording/stop
/// Stop every recorder and return the final stats
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    info!("Stopping recording session {}", state.session.id());

    let (outcomes, stats) = match blocking(&state.session, |s| (s.stop(), s.stats())).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    let failure = outcomes.iter().find_map(|o| o.error.clone());
    match failure {
        Some(err) => error_response(&err, Some(outcomes)),
        None => (StatusCode::OK, Json(StopRecordingResponse { outcomes, stats })).into_response(),
    }
}

/// POST /recording/reset
pub async fn reset_recording(State(state): State<AppState>) -> Response {
    match blocking(&state.session, |s| s.reset().map(|_| s.stats())).await {
        Ok(Ok(stats)) => (StatusCode::OK, Json(stats)).into_response(),
        Ok(Err(e)) => error_response(&e, None),
        Err(response) => response,
    }
}

/// GET /recording/preview.png
/// Latest preview frame as PNG
pub async fn get_preview(State(state): State<AppState>) -> Response {
    let grabbed = match blocking(&state.session, |s| s.preview_image()).await {
        Ok(grabbed) => grabbed,
        Err(response) => return response,
    };

    let image = match grabbed {
        Some(Ok(image)) => image,
        Some(Err(e)) => return error_response(&e, None),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Preview is disabled".to_string(),
                    outcomes: None,
                }),
            )
                .into_response()
        }
    };

    match encode_png(&image) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            error!("Failed to encode preview: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to encode preview: {:#}", e),
                    outcomes: None,
                }),
            )
                .into_response()
        }
    }
}
