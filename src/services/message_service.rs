use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::Conversation;
use crate::models::fallback_label;
use crate::models::message::{
    rendered_content, MessageView, NewMessage, ReplySnapshot, StoredMessage,
};
use crate::services::directory::ParticipantDirectory;
use crate::store::ChatStore;

/// Upper bound on message content, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// The ordered message log: validated appends with reply snapshots, and
/// history reads resolved for a particular caller.
///
/// Membership is the caller's concern; `append` takes a conversation the
/// composition already checked the sender against.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn ParticipantDirectory>,
}

impl MessageService {
    pub fn new(store: Arc<dyn ChatStore>, directory: Arc<dyn ParticipantDirectory>) -> Self {
        Self { store, directory }
    }

    /// Validates and appends. Content is trimmed first; nothing is written
    /// when validation fails.
    pub async fn append(
        &self,
        conversation: &Conversation,
        sender_id: Uuid,
        content: &str,
        reply_to: Option<Uuid>,
    ) -> AppResult<StoredMessage> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(AppError::BadRequest("message content is empty".into()));
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "message content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        let reply_snapshot = match reply_to {
            Some(target_id) => Some(self.snapshot_reply(conversation.id, target_id).await?),
            None => None,
        };
        self.store
            .append_message(NewMessage {
                conversation_id: conversation.id,
                sender_id,
                content: trimmed.to_string(),
                reply_to: reply_snapshot,
            })
            .await
    }

    /// Captures the reply target as it reads right now. A target that is
    /// already deleted is snapshotted as the deletion marker; later changes
    /// to the target never touch the snapshot.
    async fn snapshot_reply(
        &self,
        conversation_id: Uuid,
        target_id: Uuid,
    ) -> AppResult<ReplySnapshot> {
        let target = self
            .store
            .message(target_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if target.conversation_id != conversation_id {
            return Err(AppError::CrossConversationReply);
        }
        let sender_label = match self.directory.lookup(target.sender_id).await? {
            Some(profile) => profile.label().to_string(),
            None => fallback_label(target.sender_id),
        };
        Ok(ReplySnapshot {
            message_id: target.id,
            sender_label,
            content: rendered_content(&target.content, target.deleted_at.is_some()),
        })
    }

    /// History in ascending sequence order with like state resolved for the
    /// caller. A limit keeps the newest messages; non-positive limits read
    /// as unlimited.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<MessageView>> {
        let limit = limit.filter(|n| *n > 0);
        let messages = self.store.messages(conversation_id, limit).await?;
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let likes = self.store.likes_for_messages(&ids, caller).await?;
        Ok(messages
            .iter()
            .map(|m| {
                let state = likes.get(&m.id).copied().unwrap_or_default();
                MessageView::for_caller(m, state.count, state.liked_by_viewer)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::DELETION_MARKER;
    use crate::models::Profile;
    use crate::services::directory::StaticDirectory;
    use crate::store::MemStore;

    struct Fixture {
        service: MessageService,
        store: Arc<MemStore>,
        conversation: Conversation,
        a: Uuid,
        b: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let directory = StaticDirectory::strict();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        directory
            .insert(
                a,
                Profile {
                    username: "ana".into(),
                    display_name: Some("Ana".into()),
                    avatar_url: None,
                },
            )
            .await;
        directory
            .insert(
                b,
                Profile {
                    username: "ben".into(),
                    display_name: None,
                    avatar_url: None,
                },
            )
            .await;
        let conversation = store.create_direct(a, b).await.unwrap();
        let service = MessageService::new(store.clone(), Arc::new(directory));
        Fixture {
            service,
            store,
            conversation,
            a,
            b,
        }
    }

    #[tokio::test]
    async fn append_trims_and_rejects_blank_content() {
        let fx = fixture().await;
        let stored = fx
            .service
            .append(&fx.conversation, fx.a, "  match at 6?  ", None)
            .await
            .unwrap();
        assert_eq!(stored.content, "match at 6?");

        let err = fx
            .service
            .append(&fx.conversation, fx.a, "   \n\t ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        // Nothing was written for the rejected append.
        assert_eq!(fx.store.messages(fx.conversation.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_rejects_oversized_content() {
        let fx = fixture().await;
        let huge = "x".repeat(MAX_CONTENT_CHARS + 1);
        let err = fx
            .service
            .append(&fx.conversation, fx.a, &huge, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn reply_snapshot_labels_the_quoted_sender() {
        let fx = fixture().await;
        let original = fx
            .service
            .append(&fx.conversation, fx.a, "who brings the bibs?", None)
            .await
            .unwrap();
        let reply = fx
            .service
            .append(&fx.conversation, fx.b, "I do", Some(original.id))
            .await
            .unwrap();

        let snapshot = reply.reply_to.unwrap();
        assert_eq!(snapshot.message_id, original.id);
        assert_eq!(snapshot.sender_label, "Ana");
        assert_eq!(snapshot.content, "who brings the bibs?");
    }

    #[tokio::test]
    async fn reply_to_foreign_conversation_is_rejected() {
        let fx = fixture().await;
        let elsewhere = fx.store.create_direct(fx.a, Uuid::new_v4()).await.unwrap();
        let foreign = fx
            .service
            .append(&elsewhere, fx.a, "different pitch", None)
            .await
            .unwrap();

        let err = fx
            .service
            .append(&fx.conversation, fx.b, "quoting that", Some(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CrossConversationReply));
    }

    #[tokio::test]
    async fn reply_to_missing_message_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .service
            .append(&fx.conversation, fx.b, "quoting ghosts", Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn deleted_target_snapshots_as_marker() {
        let fx = fixture().await;
        let original = fx
            .service
            .append(&fx.conversation, fx.a, "oops wrong chat", None)
            .await
            .unwrap();
        fx.store.mark_deleted(original.id).await.unwrap();

        let reply = fx
            .service
            .append(&fx.conversation, fx.b, "what was that?", Some(original.id))
            .await
            .unwrap();
        assert_eq!(reply.reply_to.unwrap().content, DELETION_MARKER);
    }

    #[tokio::test]
    async fn list_resolves_likes_for_the_caller() {
        let fx = fixture().await;
        let first = fx
            .service
            .append(&fx.conversation, fx.a, "great game", None)
            .await
            .unwrap();
        fx.service
            .append(&fx.conversation, fx.b, "rematch saturday?", None)
            .await
            .unwrap();
        fx.store.add_like(first.id, fx.b).await.unwrap();

        let seen_by_b = fx.service.list(fx.conversation.id, fx.b, None).await.unwrap();
        assert_eq!(seen_by_b.len(), 2);
        assert_eq!(seen_by_b[0].like_count, 1);
        assert!(seen_by_b[0].liked_by_caller);

        let seen_by_a = fx.service.list(fx.conversation.id, fx.a, None).await.unwrap();
        assert_eq!(seen_by_a[0].like_count, 1);
        assert!(!seen_by_a[0].liked_by_caller);
    }
}
