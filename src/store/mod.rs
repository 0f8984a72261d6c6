pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::{Conversation, ConversationSummary};
use crate::models::message::{NewMessage, StoredMessage};
use crate::models::notification::NewNotification;

pub use memory::MemStore;
pub use postgres::PgStore;

/// Like state of one message as seen by a particular viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LikeState {
    pub count: i64,
    pub liked_by_viewer: bool,
}

/// Persistence port for conversations, the message log, read marks, likes
/// and notification records. Backed by Postgres in production and by an
/// in-memory map in development and tests.
///
/// Authorization is not enforced here. Callers check membership before
/// invoking mutations; the store only upholds structural invariants
/// (pair uniqueness, dense sequence numbers, watermark monotonicity).
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Returns the existing conversation for this exact two-party pair, or
    /// creates it. Concurrent calls for the same pair converge on one row.
    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    /// Creates a group conversation. Groups are never deduplicated.
    async fn create_group(&self, participants: &[Uuid]) -> AppResult<Conversation>;

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// All conversations the user belongs to, most recently active first,
    /// annotated with unread counts and last-message previews for that user.
    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>>;

    async fn summary_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ConversationSummary>>;

    /// Appends a message, allocating the next sequence number and bumping
    /// the conversation's activity timestamp in the same transaction.
    async fn append_message(&self, new: NewMessage) -> AppResult<StoredMessage>;

    async fn message(&self, id: Uuid) -> AppResult<Option<StoredMessage>>;

    /// Messages of a conversation in ascending sequence order. A limit
    /// keeps the newest messages.
    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<StoredMessage>>;

    /// Moves the reader's watermark up to the newest sequence number and
    /// flips the read flag on the messages it passes. Returns the new
    /// watermark, or `None` when the mark was already current (idempotent
    /// repeat). The watermark never moves backwards.
    async fn advance_read_mark(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<Option<i64>>;

    /// Records a like. Returns false when this user already liked the
    /// message.
    async fn add_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// Removes a like. Returns false when there was none to remove.
    async fn remove_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    async fn like_count(&self, message_id: Uuid) -> AppResult<i64>;

    /// Like state for a batch of messages from one viewer's perspective.
    /// Messages nobody liked are absent from the map.
    async fn likes_for_messages(
        &self,
        message_ids: &[Uuid],
        viewer_id: Uuid,
    ) -> AppResult<HashMap<Uuid, LikeState>>;

    /// Flags the message as deleted, keeping the row and its content.
    /// Returns false when it was already flagged.
    async fn mark_deleted(&self, message_id: Uuid) -> AppResult<bool>;

    async fn record_notification(&self, new: NewNotification) -> AppResult<()>;
}
