use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::websocket::SessionRegistry;

fn channel_for_conversation(id: Uuid) -> String {
    format!("conversation:{}", id)
}

/// Frame relayed between instances. `origin` identifies the publishing
/// instance so the loopback copy of our own publishes is dropped.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    origin: Uuid,
    conversation_id: Uuid,
    recipients: Vec<Uuid>,
    payload: String,
}

/// Redis pub/sub relay. Each instance publishes events it originates and
/// replays frames from the others into its local session registry, so a
/// recipient connected elsewhere still gets the push.
#[derive(Clone)]
pub struct Fanout {
    client: redis::Client,
    origin: Uuid,
}

impl Fanout {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            origin: Uuid::new_v4(),
        }
    }

    pub async fn publish(
        &self,
        conversation_id: Uuid,
        recipients: &[Uuid],
        payload: &str,
    ) -> redis::RedisResult<()> {
        let frame = Frame {
            origin: self.origin,
            conversation_id,
            recipients: recipients.to_vec(),
            payload: payload.to_string(),
        };
        let body = serde_json::to_string(&frame).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "fanout frame encode",
                e.to_string(),
            ))
        })?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel_for_conversation(conversation_id), body)
            .await
    }

    /// Replays frames from other instances until the connection drops.
    pub async fn listen(&self, registry: SessionRegistry) -> redis::RedisResult<()> {
        // PubSub requires a dedicated connection, not multiplexed
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.psubscribe("conversation:*").await?;
        let mut stream = pubsub.on_message();
        use futures_util::StreamExt;
        while let Some(msg) = stream.next().await {
            let body: String = match msg.get_payload() {
                Ok(body) => body,
                Err(_) => continue,
            };
            let frame: Frame = match serde_json::from_str(&body) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed fanout frame");
                    continue;
                }
            };
            if frame.origin == self.origin {
                continue;
            }
            let _ = registry.deliver(&frame.recipients, frame.payload).await;
        }
        Ok(())
    }
}

/// Keeps a listener alive for the lifetime of the process, reconnecting
/// after transport failures.
pub fn spawn_listener(fanout: Fanout, registry: SessionRegistry) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = fanout.listen(registry.clone()).await {
                tracing::warn!(error = %e, "fanout listener disconnected, retrying");
            }
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    });
}
