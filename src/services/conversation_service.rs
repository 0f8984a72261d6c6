use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{Conversation, ConversationSummary};
use crate::services::directory::ParticipantDirectory;
use crate::store::ChatStore;

/// Conversation lifecycle: creation with two-party dedup, per-user
/// listings, and the membership gate the other services go through.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn ParticipantDirectory>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, directory: Arc<dyn ParticipantDirectory>) -> Self {
        Self { store, directory }
    }

    /// Get-or-create for a two-party conversation, always-create for a
    /// group. The requesting user is part of the conversation whether or
    /// not they listed themselves; duplicate ids collapse.
    pub async fn create(
        &self,
        requesting_user: Uuid,
        participant_ids: &[Uuid],
    ) -> AppResult<ConversationSummary> {
        let mut participants: Vec<Uuid> = Vec::with_capacity(participant_ids.len() + 1);
        participants.push(requesting_user);
        for id in participant_ids {
            if !participants.contains(id) {
                participants.push(*id);
            }
        }
        if participants.len() < 2 {
            return Err(AppError::BadRequest(
                "a conversation needs at least two distinct participants".into(),
            ));
        }
        for id in &participants {
            if self.directory.lookup(*id).await?.is_none() {
                return Err(AppError::UnknownParticipant(*id));
            }
        }

        let conversation = if participants.len() == 2 {
            self.store
                .create_direct(participants[0], participants[1])
                .await?
        } else {
            self.store.create_group(&participants).await?
        };
        tracing::info!(
            conversation_id = %conversation.id,
            participants = conversation.participants.len(),
            "conversation ready"
        );
        self.store
            .summary_for_user(conversation.id, requesting_user)
            .await?
            .ok_or(AppError::Internal)
    }

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        self.store.conversations_for_user(user_id).await
    }

    pub async fn get(&self, conversation_id: Uuid, caller: Uuid) -> AppResult<ConversationSummary> {
        self.ensure_participant(conversation_id, caller).await?;
        self.store
            .summary_for_user(conversation_id, caller)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// NotFound when the conversation does not exist, NotParticipant when
    /// the user is not in it. Every conversation-scoped operation calls
    /// this before touching the log.
    pub async fn ensure_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::NotParticipant);
        }
        Ok(conversation)
    }
}
