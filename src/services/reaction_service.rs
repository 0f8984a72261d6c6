use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::Conversation;
use crate::models::message::StoredMessage;
use crate::services::conversation_service::ConversationService;
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, ChatEvent};
use crate::websocket::pubsub::Fanout;
use crate::websocket::SessionRegistry;

/// Likes and sender-only soft deletion. Any participant may react to any
/// message; only the original sender may delete one.
#[derive(Clone)]
pub struct ReactionService {
    conversations: ConversationService,
    store: Arc<dyn ChatStore>,
    registry: SessionRegistry,
    fanout: Option<Fanout>,
}

impl ReactionService {
    pub fn new(
        conversations: ConversationService,
        store: Arc<dyn ChatStore>,
        registry: SessionRegistry,
        fanout: Option<Fanout>,
    ) -> Self {
        Self {
            conversations,
            store,
            registry,
            fanout,
        }
    }

    /// Records a like and returns the new total. `AlreadyLiked` when this
    /// user's like is already there; the count is untouched in that case.
    pub async fn like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let (message, conversation) = self.message_in_reach(message_id, user_id).await?;
        if !self.store.add_like(message_id, user_id).await? {
            return Err(AppError::AlreadyLiked);
        }
        let like_count = self.store.like_count(message_id).await?;
        self.push_to_others(
            &conversation,
            user_id,
            ChatEvent::ReactionAdded {
                message_id: message.id,
                like_count,
            },
        )
        .await;
        Ok(like_count)
    }

    /// Removes a like and returns the new total. `NotLiked` when there was
    /// nothing to remove.
    pub async fn unlike(&self, message_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let (message, conversation) = self.message_in_reach(message_id, user_id).await?;
        if !self.store.remove_like(message_id, user_id).await? {
            return Err(AppError::NotLiked);
        }
        let like_count = self.store.like_count(message_id).await?;
        self.push_to_others(
            &conversation,
            user_id,
            ChatEvent::ReactionRemoved {
                message_id: message.id,
                like_count,
            },
        )
        .await;
        Ok(like_count)
    }

    /// Soft-deletes the caller's own message. The row keeps its position,
    /// likes, and inbound reply snapshots; readers see the deletion marker.
    /// Deleting an already-deleted message succeeds without a broadcast.
    pub async fn delete(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let (message, conversation) = self.message_in_reach(message_id, user_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::NotAuthorized);
        }
        if self.store.mark_deleted(message_id).await? {
            self.push_to_others(
                &conversation,
                user_id,
                ChatEvent::MessageDeleted { message_id },
            )
            .await;
        }
        Ok(())
    }

    /// Resolves the message and checks the actor belongs to its
    /// conversation. `NotFound` before `NotParticipant`, so outsiders learn
    /// nothing beyond the id being real.
    async fn message_in_reach(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<(StoredMessage, Conversation)> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let conversation = self
            .conversations
            .ensure_participant(message.conversation_id, user_id)
            .await?;
        Ok((message, conversation))
    }

    async fn push_to_others(&self, conversation: &Conversation, actor_id: Uuid, event: ChatEvent) {
        let others: Vec<Uuid> = conversation
            .participants
            .iter()
            .copied()
            .filter(|id| *id != actor_id)
            .collect();
        broadcast_event(
            &self.registry,
            self.fanout.as_ref(),
            &others,
            conversation.id,
            actor_id,
            event,
        )
        .await;
    }
}
