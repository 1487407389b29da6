//! Crate-wide error type for the Amadeus room engine.
//!
//! Room-internal failures (admission, protocol, stale timers) are handled
//! per the taxonomy in the spec: logged and folded into `RoomStatus` or a
//! close code, never propagated as a panic. [`AmadeusError`] exists for the
//! thin HTTP boundary in `apps/server` and for the handful of fallible core
//! operations (loading a quiz, reading audio bytes) whose failure the
//! controller must still observe.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error code, mirrored in JSON error responses.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the Amadeus server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AmadeusError {
    /// The requested room does not exist and the caller did not request creation.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Loading the quiz for a room failed (SongLibrary error).
    #[error("failed to load quiz: {0}")]
    QuizLoad(String),

    /// Reading audio bytes for a question failed.
    #[error("failed to read audio: {0}")]
    AudioRead(String),

    /// A caller-supplied session id was not resolvable.
    #[error("unknown session")]
    UnknownSession,

    /// Malformed request at the thin HTTP boundary.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error that should not normally surface to a client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for AmadeusError {
    fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::QuizLoad(_) => "quiz_load_failed",
            Self::AudioRead(_) => "audio_read_failed",
            Self::UnknownSession => "unknown_session",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl AmadeusError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownSession => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::QuizLoad(_) | Self::AudioRead(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for AmadeusError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AmadeusResult<T> = Result<T, AmadeusError>;
