use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{direct_key, Conversation, ConversationSummary};
use crate::models::message::{rendered_content, NewMessage, StoredMessage};
use crate::models::notification::{NewNotification, Notification};
use crate::store::{ChatStore, LikeState};

/// In-memory backend for development and the hermetic test suites. One
/// write lock over the whole state; mutations that span several maps stay
/// atomic the same way a database transaction would.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    direct_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, StoredMessage>,
    /// Message ids per conversation in sequence order.
    order: HashMap<Uuid, Vec<Uuid>>,
    read_marks: HashMap<(Uuid, Uuid), i64>,
    likes: HashMap<Uuid, HashSet<Uuid>>,
    notifications: Vec<Notification>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notification records written for one recipient, oldest first.
    pub async fn notifications_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        let inner = self.inner.read().await;
        inner
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn summary(&self, conversation: &Conversation, user_id: Uuid) -> ConversationSummary {
        let watermark = self
            .read_marks
            .get(&(conversation.id, user_id))
            .copied()
            .unwrap_or(0);
        let ids = self.order.get(&conversation.id);
        let last_message_preview = ids
            .and_then(|ids| ids.last())
            .and_then(|id| self.messages.get(id))
            .map(|m| rendered_content(&m.content, m.deleted_at.is_some()));
        let unread_count = ids
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.messages.get(id))
                    .filter(|m| m.sender_id != user_id && m.seq > watermark)
                    .count() as i64
            })
            .unwrap_or(0);
        ConversationSummary {
            id: conversation.id,
            participants: conversation.participants.clone(),
            last_message_preview,
            unread_count,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

fn new_conversation(participants: Vec<Uuid>) -> Conversation {
    let now = Utc::now();
    Conversation {
        id: Uuid::new_v4(),
        participants,
        last_seq: 0,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ChatStore for MemStore {
    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let key = direct_key(a, b);
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.direct_index.get(&key) {
            if let Some(existing) = inner.conversations.get(id) {
                return Ok(existing.clone());
            }
        }
        let conversation = new_conversation(vec![a, b]);
        inner.direct_index.insert(key, conversation.id);
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn create_group(&self, participants: &[Uuid]) -> AppResult<Conversation> {
        let conversation = new_conversation(participants.to_vec());
        let mut inner = self.inner.write().await;
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<ConversationSummary> = inner
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .map(|c| inner.summary(c, user_id))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn summary_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ConversationSummary>> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .get(&conversation_id)
            .map(|c| inner.summary(c, user_id)))
    }

    async fn append_message(&self, new: NewMessage) -> AppResult<StoredMessage> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let seq = {
            let conversation = inner
                .conversations
                .get_mut(&new.conversation_id)
                .ok_or(AppError::NotFound)?;
            conversation.last_seq += 1;
            conversation.updated_at = now;
            conversation.last_seq
        };
        let message = StoredMessage {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            seq,
            content: new.content,
            reply_to: new.reply_to,
            read_at: None,
            deleted_at: None,
            created_at: now,
        };
        inner
            .order
            .entry(new.conversation_id)
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn message(&self, id: Uuid) -> AppResult<Option<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        let ids = match inner.order.get(&conversation_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        let skip = match limit {
            Some(n) if (n as usize) < ids.len() => ids.len() - n as usize,
            _ => 0,
        };
        Ok(ids
            .iter()
            .skip(skip)
            .filter_map(|id| inner.messages.get(id))
            .cloned()
            .collect())
    }

    async fn advance_read_mark(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<Option<i64>> {
        let mut inner = self.inner.write().await;
        let newest = inner
            .conversations
            .get(&conversation_id)
            .ok_or(AppError::NotFound)?
            .last_seq;
        if newest == 0 {
            return Ok(None);
        }
        let mark = inner
            .read_marks
            .entry((conversation_id, reader_id))
            .or_insert(0);
        if *mark >= newest {
            return Ok(None);
        }
        *mark = newest;
        let now = Utc::now();
        let ids = inner.order.get(&conversation_id).cloned().unwrap_or_default();
        for id in ids {
            if let Some(message) = inner.messages.get_mut(&id) {
                if message.sender_id != reader_id
                    && message.seq <= newest
                    && message.read_at.is_none()
                {
                    message.read_at = Some(now);
                }
            }
        }
        Ok(Some(newest))
    }

    async fn add_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.messages.contains_key(&message_id) {
            return Err(AppError::NotFound);
        }
        Ok(inner.likes.entry(message_id).or_default().insert(user_id))
    }

    async fn remove_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .likes
            .get_mut(&message_id)
            .map(|users| users.remove(&user_id))
            .unwrap_or(false))
    }

    async fn like_count(&self, message_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .likes
            .get(&message_id)
            .map(|users| users.len() as i64)
            .unwrap_or(0))
    }

    async fn likes_for_messages(
        &self,
        message_ids: &[Uuid],
        viewer_id: Uuid,
    ) -> AppResult<HashMap<Uuid, LikeState>> {
        let inner = self.inner.read().await;
        let mut out = HashMap::new();
        for id in message_ids {
            if let Some(users) = inner.likes.get(id) {
                if users.is_empty() {
                    continue;
                }
                out.insert(
                    *id,
                    LikeState {
                        count: users.len() as i64,
                        liked_by_viewer: users.contains(&viewer_id),
                    },
                );
            }
        }
        Ok(out)
    }

    async fn mark_deleted(&self, message_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound)?;
        if message.deleted_at.is_some() {
            return Ok(false);
        }
        message.deleted_at = Some(Utc::now());
        Ok(true)
    }

    async fn record_notification(&self, new: NewNotification) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.notifications.push(Notification {
            id: Uuid::new_v4(),
            recipient_id: new.recipient_id,
            conversation_id: new.conversation_id,
            actor_id: new.actor_id,
            preview: new.preview,
            is_read: false,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str, conversation_id: Uuid, sender_id: Uuid) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id,
            content: body.into(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn direct_conversations_deduplicate() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = store.create_direct(a, b).await.unwrap();
        let second = store.create_direct(b, a).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn group_conversations_never_deduplicate() {
        let store = MemStore::new();
        let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let first = store.create_group(&users).await.unwrap();
        let second = store.create_group(&users).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn append_allocates_dense_sequence() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        for expected in 1..=5 {
            let stored = store
                .append_message(text("hey", conv.id, a))
                .await
                .unwrap();
            assert_eq!(stored.seq, expected);
        }
        let reloaded = store.conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_seq, 5);
        assert!(reloaded.updated_at > conv.updated_at);
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails() {
        let store = MemStore::new();
        let err = store
            .append_message(text("hey", Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn read_mark_is_monotonic_and_idempotent() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        store.append_message(text("one", conv.id, a)).await.unwrap();
        store.append_message(text("two", conv.id, a)).await.unwrap();

        assert_eq!(store.advance_read_mark(conv.id, b).await.unwrap(), Some(2));
        assert_eq!(store.advance_read_mark(conv.id, b).await.unwrap(), None);

        let messages = store.messages(conv.id, None).await.unwrap();
        assert!(messages.iter().all(|m| m.read_at.is_some()));
    }

    #[tokio::test]
    async fn read_mark_skips_own_messages() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        store.append_message(text("mine", conv.id, a)).await.unwrap();

        assert_eq!(store.advance_read_mark(conv.id, a).await.unwrap(), Some(1));
        let messages = store.messages(conv.id, None).await.unwrap();
        assert!(messages[0].read_at.is_none());
    }

    #[tokio::test]
    async fn empty_conversation_has_nothing_to_read() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        assert_eq!(store.advance_read_mark(conv.id, a).await.unwrap(), None);
    }

    #[tokio::test]
    async fn likes_are_set_semantics() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        let msg = store.append_message(text("goal!", conv.id, a)).await.unwrap();

        assert!(store.add_like(msg.id, b).await.unwrap());
        assert!(!store.add_like(msg.id, b).await.unwrap());
        assert_eq!(store.like_count(msg.id).await.unwrap(), 1);
        assert!(store.remove_like(msg.id, b).await.unwrap());
        assert!(!store.remove_like(msg.id, b).await.unwrap());
        assert_eq!(store.like_count(msg.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unread_counts_exclude_own_messages() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        store.append_message(text("one", conv.id, a)).await.unwrap();
        store.append_message(text("two", conv.id, a)).await.unwrap();
        store.append_message(text("three", conv.id, b)).await.unwrap();

        let for_b = store.summary_for_user(conv.id, b).await.unwrap().unwrap();
        assert_eq!(for_b.unread_count, 2);
        let for_a = store.summary_for_user(conv.id, a).await.unwrap().unwrap();
        assert_eq!(for_a.unread_count, 1);
        assert_eq!(for_a.last_message_preview.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn message_limit_keeps_newest() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        for i in 1..=10 {
            store
                .append_message(text(&format!("m{i}"), conv.id, a))
                .await
                .unwrap();
        }
        let tail = store.messages(conv.id, Some(3)).await.unwrap();
        let seqs: Vec<i64> = tail.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn notifications_are_recorded_per_recipient() {
        let store = MemStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_direct(a, b).await.unwrap();
        store
            .record_notification(NewNotification {
                recipient_id: b,
                conversation_id: conv.id,
                actor_id: a,
                preview: "kickoff moved to 7pm".into(),
            })
            .await
            .unwrap();

        let for_b = store.notifications_for(b).await;
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].preview, "kickoff moved to 7pm");
        assert!(!for_b[0].is_read);
        assert!(store.notifications_for(a).await.is_empty());
    }
}
