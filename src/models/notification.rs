use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable fallback for a recipient who had no live session when a message
/// arrived. Owned here at write time; the notification center reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub conversation_id: Uuid,
    pub actor_id: Uuid,
    pub preview: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub conversation_id: Uuid,
    pub actor_id: Uuid,
    pub preview: String,
}
