//! HTTP API server for headless control
//!
//! This module provides a REST API over one recording session:
//! - GET /health - Health check
//! - GET /recording/status - Aggregate and per-recorder state
//! - POST /recording/{start,pause,resume,stop,reset} - Recording control
//! - GET /recording/preview.png - Latest preview frame

mod handlers;
mod routes;
mod state;

pub use handlers::status_for;
pub use routes::create_router;
pub use state::AppState;
