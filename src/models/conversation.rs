use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    /// Highest message sequence number handed out so far; 0 when empty.
    pub last_seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_direct(&self) -> bool {
        self.participants.len() == 2
    }
}

/// Canonical identity for a two-party conversation: the sorted uuid pair.
/// Group conversations have no key and are never deduplicated.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Per-user listing row: a conversation annotated with what this user
/// hasn't seen yet and what to show as the last-activity line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub last_message_preview: Option<String>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
