use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::message::MessageView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub reply_to: Option<Uuid>,
    /// Opaque client-side correlation tag, echoed back unchanged.
    pub client_tag: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    #[serde(flatten)]
    pub message: MessageView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
}

/// POST /conversations/:id/messages.
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), AppError> {
    let message = state
        .delivery
        .send(conversation_id, user.id, &body.content, body.reply_to)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message,
            client_tag: body.client_tag,
        }),
    ))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    /// When present, keeps only the newest `limit` messages.
    pub limit: Option<i64>,
}

/// GET /conversations/:id/messages, ascending sequence order.
pub async fn get_message_history(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    state
        .conversations
        .ensure_participant(conversation_id, user.id)
        .await?;
    let messages = state
        .messages
        .list(conversation_id, user.id, params.limit)
        .await?;
    Ok(Json(messages))
}

/// DELETE /messages/:id. Sender-only soft delete.
pub async fn delete_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.reactions.delete(message_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
