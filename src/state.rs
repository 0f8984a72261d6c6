use std::sync::Arc;

use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::delivery_service::DeliveryService;
use crate::services::directory::ParticipantDirectory;
use crate::services::message_service::MessageService;
use crate::services::notify::{NotificationSink, StoreNotificationSink};
use crate::services::reaction_service::ReactionService;
use crate::services::read_service::ReadService;
use crate::store::ChatStore;
use crate::websocket::pubsub::Fanout;
use crate::websocket::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub registry: SessionRegistry,
    pub fanout: Option<Fanout>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub delivery: DeliveryService,
    pub reads: ReadService,
    pub reactions: ReactionService,
}

impl AppState {
    /// Wires the service graph over one store, directory, and session
    /// registry. `fanout` is absent when Redis is not configured; the
    /// instance then runs standalone.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn ParticipantDirectory>,
        registry: SessionRegistry,
        fanout: Option<Fanout>,
    ) -> Self {
        let conversations = ConversationService::new(store.clone(), directory.clone());
        let messages = MessageService::new(store.clone(), directory);
        let notifier: Arc<dyn NotificationSink> =
            Arc::new(StoreNotificationSink::new(store.clone()));
        let delivery = DeliveryService::new(
            conversations.clone(),
            messages.clone(),
            registry.clone(),
            notifier,
            fanout.clone(),
        );
        let reads = ReadService::new(
            conversations.clone(),
            store.clone(),
            registry.clone(),
            fanout.clone(),
        );
        let reactions = ReactionService::new(
            conversations.clone(),
            store.clone(),
            registry.clone(),
            fanout.clone(),
        );

        Self {
            config,
            store,
            registry,
            fanout,
            conversations,
            messages,
            delivery,
            reads,
            reactions,
        }
    }
}
