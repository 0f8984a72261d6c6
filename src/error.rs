use crate::middleware::error_handling;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_handling::into_response(self).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("only the sender may delete a message")]
    NotAuthorized,

    #[error("unknown participant: {0}")]
    UnknownParticipant(uuid::Uuid),

    #[error("reply target belongs to a different conversation")]
    CrossConversationReply,

    #[error("message already liked")]
    AlreadyLiked,

    #[error("message not liked")]
    NotLiked,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_)
            | AppError::UnknownParticipant(_)
            | AppError::CrossConversationReply => 400,
            AppError::Unauthorized => 401,
            AppError::NotParticipant | AppError::NotAuthorized => 403,
            AppError::NotFound => 404,
            AppError::AlreadyLiked | AppError::NotLiked => 409,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}
