use super::state::AppState;
use crate::controller::RecordingReport;
use crate::error::StoreError;
use crate::memo::Memo;
use crate::recording::{SessionState, VolumeLevel};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RecordingStatusResponse {
    pub state: SessionState,
    pub recording: bool,
    pub level: VolumeLevel,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: String,
    /// Url of the stored memo, when one was saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub message: String,
}

impl From<RecordingReport> for StopRecordingResponse {
    fn from(report: RecordingReport) -> Self {
        match report {
            RecordingReport::Saved(url) => Self {
                status: "saved".to_string(),
                message: format!("Memo {} saved", url),
                url: Some(url),
            },
            RecordingReport::Cancelled => Self {
                status: "cancelled".to_string(),
                url: None,
                message: "Recording discarded".to_string(),
            },
            RecordingReport::Failed(e) => Self {
                status: "failed".to_string(),
                url: None,
                message: e.to_string(),
            },
            RecordingReport::Unsaved(e) => Self {
                status: "unsaved".to_string(),
                url: None,
                message: e,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(url) => {
            error_response(StatusCode::NOT_FOUND, format!("Memo {} not found", url))
        }
        other => {
            error!("Memo store error: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

// ============================================================================
// Recording handlers
// ============================================================================

/// POST /record/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    if !state.recorder.start_recording() {
        return error_response(StatusCode::CONFLICT, "A recording is already in progress");
    }

    info!("Recording started via HTTP");

    (StatusCode::ACCEPTED, Json(status_of(&state))).into_response()
}

/// POST /record/stop
/// Stop the current recording and wait until it has been handled
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.recorder.stop_recording();
    finish(&state).await
}

/// POST /record/cancel
pub async fn cancel_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.recorder.cancel();
    finish(&state).await
}

/// GET /record/status
pub async fn recording_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(status_of(&state))
}

fn status_of(state: &AppState) -> RecordingStatusResponse {
    RecordingStatusResponse {
        state: state.recorder.state(),
        recording: state.recorder.is_recording(),
        level: state.recorder.current_level(),
    }
}

async fn finish(state: &AppState) -> Response {
    match state.recorder.finished().await {
        Some(report) => {
            (StatusCode::OK, Json(StopRecordingResponse::from(report))).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "No recording in progress"),
    }
}

// ============================================================================
// Memo handlers
// ============================================================================

/// GET /memos
pub async fn list_memos(State(state): State<AppState>) -> impl IntoResponse {
    match state.memos.list().await {
        Ok(memos) => (StatusCode::OK, Json(memos)).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// GET /memos/:url
pub async fn get_memo(State(state): State<AppState>, Path(url): Path<String>) -> impl IntoResponse {
    match state.store.get(&url).await {
        Ok(memo) => (StatusCode::OK, Json(memo)).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// GET /memos/:url/audio
pub async fn get_memo_audio(
    State(state): State<AppState>,
    Path(url): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&url).await {
        Ok(Memo {
            audio,
            audio_mime_type,
            ..
        }) => (StatusCode::OK, [(header::CONTENT_TYPE, audio_mime_type)], audio).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// PUT /memos/:url
pub async fn update_memo(
    State(state): State<AppState>,
    Path(url): Path<String>,
    Json(req): Json<UpdateMemoRequest>,
) -> impl IntoResponse {
    match state.memos.save_edit(&url, &req.title, req.description).await {
        Ok(memo) => (StatusCode::OK, Json(memo)).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// DELETE /memos/:url
pub async fn delete_memo(
    State(state): State<AppState>,
    Path(url): Path<String>,
) -> impl IntoResponse {
    match state.memos.delete_memo(&url).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::CONFLICT, "Delete was not confirmed"),
        Err(e) => store_error_response(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
