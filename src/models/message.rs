use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What readers see in place of a soft-deleted message. The stored content
/// is kept intact for moderation; substitution happens at view time only.
pub const DELETION_MARKER: &str = "[deleted]";

pub fn rendered_content(content: &str, deleted: bool) -> String {
    if deleted {
        DELETION_MARKER.to_string()
    } else {
        content.to_string()
    }
}

/// A message as the store holds it. `content` is the original text even
/// after soft deletion.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub seq: i64,
    pub content: String,
    pub reply_to: Option<ReplySnapshot>,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized copy of the reply target taken at send time. Later edits or
/// deletion of the target do not touch this snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub message_id: Uuid,
    pub sender_label: String,
    pub content: String,
}

/// Fields for a message about to be appended. `seq` and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub reply_to: Option<ReplySnapshot>,
}

/// A message as clients see it: deletion redacted, like state resolved for
/// the viewing user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub seq: i64,
    pub content: String,
    pub reply_to: Option<ReplySnapshot>,
    pub deleted: bool,
    pub read: bool,
    pub like_count: i64,
    pub liked_by_caller: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    /// View of a message that was appended a moment ago: unread, unliked.
    pub fn fresh(message: &StoredMessage) -> Self {
        Self::for_caller(message, 0, false)
    }

    pub fn for_caller(message: &StoredMessage, like_count: i64, liked_by_caller: bool) -> Self {
        let deleted = message.deleted_at.is_some();
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            seq: message.seq,
            content: rendered_content(&message.content, deleted),
            reply_to: message.reply_to.clone(),
            deleted,
            read: message.read_at.is_some(),
            like_count,
            liked_by_caller,
            created_at: message.created_at,
        }
    }
}
