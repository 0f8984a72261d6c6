use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::conversation::ConversationSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
}

/// POST /conversations. The caller is always included; creating a direct
/// conversation that already exists returns the existing one.
pub async fn create_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), AppError> {
    let summary = state
        .conversations
        .create(user.id, &body.participant_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /conversations, most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    Ok(Json(state.conversations.list(user.id).await?))
}

/// GET /conversations/:id.
pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationSummary>, AppError> {
    Ok(Json(
        state.conversations.get(conversation_id, user.id).await?,
    ))
}

/// POST /conversations/:id/read. Idempotent; re-reading with nothing new
/// is still a 204.
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.reads.mark_read(conversation_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
