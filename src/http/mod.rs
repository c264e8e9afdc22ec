//! HTTP API for driving the recorder and browsing memos
//!
//! - GET /health - Health check
//! - POST /record/start - Start a new recording
//! - POST /record/stop - Stop and save the current recording
//! - POST /record/cancel - Discard the current recording
//! - GET /record/status - Session state and live volume
//! - GET /memos - Stored memos, newest first
//! - GET /memos/:url - One memo's metadata
//! - GET /memos/:url/audio - One memo's audio
//! - PUT /memos/:url - Edit title and description
//! - DELETE /memos/:url - Delete a memo

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
