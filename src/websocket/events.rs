//! Real-time event vocabulary.
//!
//! Every event shares one flat JSON envelope:
//!
//! ```json
//! {
//!     "type": "message.created",
//!     "timestamp": "2026-05-14T18:30:00Z",
//!     "conversation_id": "uuid",
//!     "user_id": "uuid",
//!     ...variant fields...
//! }
//! ```
//!
//! `user_id` is the acting user. Serialization happens here and nowhere
//! else; handlers never build event JSON by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::MessageView;
use crate::websocket::pubsub::Fanout;
use crate::websocket::SessionRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A message was appended. Carries the full view so clients can render
    /// it without a follow-up fetch.
    #[serde(rename = "message.created")]
    MessageCreated { message: MessageView },

    /// The acting user's read watermark advanced.
    #[serde(rename = "message.read")]
    MessageRead { last_read_seq: i64 },

    /// A message was soft-deleted; clients swap in the deletion marker.
    #[serde(rename = "message.deleted")]
    MessageDeleted { message_id: Uuid },

    #[serde(rename = "reaction.added")]
    ReactionAdded { message_id: Uuid, like_count: i64 },

    #[serde(rename = "reaction.removed")]
    ReactionRemoved { message_id: Uuid, like_count: i64 },

    /// Conversation activity changed; listing rows should resort.
    #[serde(rename = "conversation.updated")]
    ConversationUpdated {
        preview: String,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "typing.started")]
    TypingStarted,

    #[serde(rename = "typing.stopped")]
    TypingStopped,
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message.created",
            Self::MessageRead { .. } => "message.read",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::ReactionAdded { .. } => "reaction.added",
            Self::ReactionRemoved { .. } => "reaction.removed",
            Self::ConversationUpdated { .. } => "conversation.updated",
            Self::TypingStarted => "typing.started",
            Self::TypingStopped => "typing.stopped",
        }
    }

    pub fn to_payload_value(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
            "conversation_id": conversation_id,
            "user_id": actor_id,
        });

        // Externally tagged serialization wraps the fields in a single
        // variant key; lift them out so the payload stays flat.
        if let serde_json::Value::Object(tagged) = serde_json::to_value(self)? {
            if let Some(serde_json::Value::Object(fields)) = tagged.into_values().next() {
                for (key, value) in fields {
                    payload[key] = value;
                }
            }
        }

        Ok(payload)
    }

    pub fn to_broadcast_payload(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> Result<String, serde_json::Error> {
        let value = self.to_payload_value(conversation_id, actor_id)?;
        serde_json::to_string(&value)
    }
}

/// Pushes the event to the given recipients' live sessions and relays it to
/// the other instances. Returns the recipients with no live session here.
///
/// Broadcast is best effort by contract: fanout and socket failures are
/// logged, never propagated, and never affect already-persisted state.
pub async fn broadcast_event(
    registry: &SessionRegistry,
    fanout: Option<&Fanout>,
    recipients: &[Uuid],
    conversation_id: Uuid,
    actor_id: Uuid,
    event: ChatEvent,
) -> Vec<Uuid> {
    if recipients.is_empty() {
        return Vec::new();
    }
    let payload = match event.to_broadcast_payload(conversation_id, actor_id) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, event = event.event_type(), "event serialization failed");
            return recipients.to_vec();
        }
    };
    crate::metrics::record_broadcast(event.event_type());

    let offline = registry.deliver(recipients, payload.clone()).await;
    if let Some(fanout) = fanout {
        if let Err(e) = fanout.publish(conversation_id, recipients, &payload).await {
            tracing::debug!(error = %e, "fanout publish failed; event delivered locally only");
        }
    }
    offline
}
