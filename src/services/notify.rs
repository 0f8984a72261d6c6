use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::notification::NewNotification;
use crate::store::ChatStore;

/// Fallback channel for recipients with no live session at delivery time.
/// Callers treat failures as losses to log, never as reasons to unwind the
/// message itself.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Uuid,
        preview: &str,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<()>;
}

/// Records notifications next to the messages; the platform's notification
/// center reads them from there.
pub struct StoreNotificationSink {
    store: Arc<dyn ChatStore>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    async fn notify(
        &self,
        recipient_id: Uuid,
        preview: &str,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<()> {
        self.store
            .record_notification(NewNotification {
                recipient_id,
                conversation_id,
                actor_id,
                preview: preview.to_string(),
            })
            .await
    }
}
