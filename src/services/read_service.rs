use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppResult;
use crate::services::conversation_service::ConversationService;
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, ChatEvent};
use crate::websocket::pubsub::Fanout;
use crate::websocket::SessionRegistry;

/// Read watermark updates with the matching broadcast. Repeated calls with
/// nothing new to read stay silent on the wire.
#[derive(Clone)]
pub struct ReadService {
    conversations: ConversationService,
    store: Arc<dyn ChatStore>,
    registry: SessionRegistry,
    fanout: Option<Fanout>,
}

impl ReadService {
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

    /// Moves the caller's watermark to the newest message. Returns the new
    /// watermark when it advanced, `None` when there was nothing to catch
    /// up on. Only an actual advance is broadcast.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<Option<i64>> {
        let conversation = self
            .conversations
            .ensure_participant(conversation_id, reader_id)
            .await?;

        let Some(last_read_seq) = self
            .store
            .advance_read_mark(conversation_id, reader_id)
            .await?
        else {
            return Ok(None);
        };

        broadcast_event(
            &self.registry,
            self.fanout.as_ref(),
            &conversation.participants,
            conversation_id,
            reader_id,
            ChatEvent::MessageRead { last_read_seq },
        )
        .await;
        Ok(Some(last_read_seq))
    }
}
