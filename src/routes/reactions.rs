use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::state::AppState;

#[derive(Serialize)]
pub struct LikeCountResponse {
    pub like_count: i64,
}

/// POST /messages/:id/likes. 409 when the caller already liked it.
pub async fn add_like(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<Json<LikeCountResponse>, AppError> {
    let like_count = state.reactions.like(message_id, user.id).await?;
    Ok(Json(LikeCountResponse { like_count }))
}

/// DELETE /messages/:id/likes. 409 when there is no like to remove.
pub async fn remove_like(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<Json<LikeCountResponse>, AppError> {
    let like_count = state.reactions.unlike(message_id, user.id).await?;
    Ok(Json(LikeCountResponse { like_count }))
}
