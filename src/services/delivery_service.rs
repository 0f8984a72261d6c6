use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::Conversation;
use crate::models::message::MessageView;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::notify::NotificationSink;
use crate::websocket::events::{broadcast_event, ChatEvent};
use crate::websocket::pubsub::Fanout;
use crate::websocket::SessionRegistry;

/// Characters of message content carried into previews and notifications.
const PREVIEW_CHARS: usize = 80;

/// One serialization point per conversation. Holding a conversation's lane
/// across persist-then-broadcast keeps local push order aligned with
/// sequence order; unrelated conversations never wait on each other.
#[derive(Clone, Default)]
pub struct ConversationLanes {
    lanes: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ConversationLanes {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lane(&self, conversation_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lane) = self.lanes.read().await.get(&conversation_id) {
            return lane.clone();
        }
        let mut lanes = self.lanes.write().await;
        lanes.entry(conversation_id).or_default().clone()
    }
}

pub fn preview_of(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// The send pipeline: authorize, persist, then push live sessions, record
/// notifications for absent recipients, and refresh everyone's listing row.
#[derive(Clone)]
pub struct DeliveryService {
    conversations: ConversationService,
    log: MessageService,
    registry: SessionRegistry,
    notifier: Arc<dyn NotificationSink>,
    fanout: Option<Fanout>,
    lanes: ConversationLanes,
}

impl DeliveryService {
    pub fn new(
        conversations: ConversationService,
        log: MessageService,
        registry: SessionRegistry,
        notifier: Arc<dyn NotificationSink>,
        fanout: Option<Fanout>,
    ) -> Self {
        Self {
            conversations,
            log,
            registry,
            notifier,
            fanout,
            lanes: ConversationLanes::new(),
        }
    }

    /// Once `append` returns the message is durable and the call reports
    /// success; push and notification failures degrade delivery only.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        reply_to: Option<Uuid>,
    ) -> AppResult<MessageView> {
        let conversation = self
            .conversations
            .ensure_participant(conversation_id, sender_id)
            .await?;

        let lane = self.lanes.lane(conversation_id).await;
        let _ordered = lane.lock().await;

        let stored = self
            .log
            .append(&conversation, sender_id, content, reply_to)
            .await?;
        crate::metrics::record_message_sent();
        info!(conversation_id = %conversation_id, seq = stored.seq, "message persisted");

        let view = MessageView::fresh(&stored);
        self.fan_out(&conversation, &view).await;
        Ok(view)
    }

    async fn fan_out(&self, conversation: &Conversation, view: &MessageView) {
        let others: Vec<Uuid> = conversation
            .participants
            .iter()
            .copied()
            .filter(|id| *id != view.sender_id)
            .collect();

        let offline = broadcast_event(
            &self.registry,
            self.fanout.as_ref(),
            &others,
            conversation.id,
            view.sender_id,
            ChatEvent::MessageCreated {
                message: view.clone(),
            },
        )
        .await;

        let preview = preview_of(&view.content);
        for recipient in offline {
            match self
                .notifier
                .notify(recipient, &preview, conversation.id, view.sender_id)
                .await
            {
                Ok(()) => crate::metrics::record_notification(),
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "offline notification failed")
                }
            }
        }

        // The sender's own listing row moves too.
        broadcast_event(
            &self.registry,
            self.fanout.as_ref(),
            &conversation.participants,
            conversation.id,
            view.sender_id,
            ChatEvent::ConversationUpdated {
                preview,
                updated_at: view.created_at,
            },
        )
        .await;
    }
}
