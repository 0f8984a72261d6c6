//! Shared fixtures for the integration tests: an in-memory backend with the
//! full service graph, plus helpers to attach fake live sessions and read
//! the events they receive.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use matchday_chat::error::{AppError, AppResult};
use matchday_chat::models::Profile;
use matchday_chat::services::conversation_service::ConversationService;
use matchday_chat::services::delivery_service::DeliveryService;
use matchday_chat::services::directory::StaticDirectory;
use matchday_chat::services::message_service::MessageService;
use matchday_chat::services::notify::NotificationSink;
use matchday_chat::services::reaction_service::ReactionService;
use matchday_chat::services::read_service::ReadService;
use matchday_chat::store::MemStore;
use matchday_chat::websocket::SessionRegistry;

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient_id: Uuid,
    pub preview: String,
    pub conversation_id: Uuid,
    pub actor_id: Uuid,
}

/// Notification sink that records every call instead of persisting.
#[derive(Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<SentNotification>>>,
}

impl CollectingSink {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn notify(
        &self,
        recipient_id: Uuid,
        preview: &str,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<()> {
        self.records.lock().unwrap().push(SentNotification {
            recipient_id,
            preview: preview.to_string(),
            conversation_id,
            actor_id,
        });
        Ok(())
    }
}

/// Sink whose every call fails; used to show delivery survives it.
#[derive(Clone, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _: Uuid, _: &str, _: Uuid, _: Uuid) -> AppResult<()> {
        Err(AppError::Internal)
    }
}

pub struct TestBackend {
    pub store: Arc<MemStore>,
    pub registry: SessionRegistry,
    pub sink: CollectingSink,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub delivery: DeliveryService,
    pub reads: ReadService,
    pub reactions: ReactionService,
}

/// Builds the full service graph over the in-memory store, with the given
/// users seeded into a strict directory.
#[allow(dead_code)]
pub async fn backend_with_users(users: &[Uuid]) -> TestBackend {
    let sink = CollectingSink::default();
    backend_with_sink(users, Arc::new(sink.clone()), sink).await
}

/// Same as [`backend_with_users`] but delivering notifications into an
/// arbitrary sink.
#[allow(dead_code)]
pub async fn backend_with_sink(
    users: &[Uuid],
    notifier: Arc<dyn NotificationSink>,
    sink: CollectingSink,
) -> TestBackend {
    let store = Arc::new(MemStore::new());
    let directory = StaticDirectory::strict();
    for (i, id) in users.iter().enumerate() {
        directory
            .insert(
                *id,
                Profile {
                    username: format!("player{i}"),
                    display_name: None,
                    avatar_url: None,
                },
            )
            .await;
    }
    let directory = Arc::new(directory);
    let registry = SessionRegistry::new();

    let conversations = ConversationService::new(store.clone(), directory.clone());
    let messages = MessageService::new(store.clone(), directory);
    let delivery = DeliveryService::new(
        conversations.clone(),
        messages.clone(),
        registry.clone(),
        notifier,
        None,
    );
    let reads = ReadService::new(conversations.clone(), store.clone(), registry.clone(), None);
    let reactions = ReactionService::new(
        conversations.clone(),
        store.clone(),
        registry.clone(),
        None,
    );

    TestBackend {
        store,
        registry,
        sink,
        conversations,
        messages,
        delivery,
        reads,
        reactions,
    }
}

/// Attaches a fake live session for the user and returns the receiving end.
#[allow(dead_code)]
pub fn attach_session(
    registry: &SessionRegistry,
    user_id: Uuid,
) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.attach(user_id, session_id, tx);
    (session_id, rx)
}

/// Pops the next already-delivered event as parsed JSON. Panics when the
/// session received nothing; delivery completes before service calls
/// return, so no waiting is involved.
#[allow(dead_code)]
pub fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    match rx.try_recv().expect("expected a websocket event") {
        Message::Text(text) => serde_json::from_str(&text).expect("event payload is json"),
        other => panic!("unexpected websocket frame: {other:?}"),
    }
}

/// Drains everything the session has received so far.
#[allow(dead_code)]
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            events.push(serde_json::from_str(&text).expect("event payload is json"));
        }
    }
    events
}
