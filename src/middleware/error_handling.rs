use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::error::AppError;

/// Wire shape for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub error_type: &'static str,
    pub code: &'static str,
}

/// Maps domain errors to HTTP responses.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorBody) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => ("validation_error", "INVALID_REQUEST"),
        AppError::UnknownParticipant(_) => ("validation_error", "UNKNOWN_PARTICIPANT"),
        AppError::CrossConversationReply => ("validation_error", "CROSS_CONVERSATION_REPLY"),
        AppError::Unauthorized => ("authentication_error", "INVALID_CREDENTIALS"),
        AppError::NotParticipant => ("authorization_error", "NOT_PARTICIPANT"),
        AppError::NotAuthorized => ("authorization_error", "NOT_MESSAGE_SENDER"),
        AppError::NotFound => ("not_found_error", "NOT_FOUND"),
        AppError::AlreadyLiked => ("conflict_error", "ALREADY_LIKED"),
        AppError::NotLiked => ("conflict_error", "NOT_LIKED"),
        AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", "INTERNAL_SERVER_ERROR")
        }
    };

    // Server-side detail stays in the logs, not on the wire.
    let message = if status.is_server_error() {
        "internal error".to_string()
    } else {
        err.to_string()
    };

    let body = ErrorBody {
        error: match status {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
        .to_string(),
        message,
        status: status.as_u16(),
        error_type,
        code,
    };

    (status, body)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, body) = map_error(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, code = body.code, "request failed");
    }
    (status, Json(body))
}
