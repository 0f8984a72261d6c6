use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::middleware::guards::User;
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, ChatEvent};

/// Client-to-server frames. Everything stateful arrives over HTTP; the
/// socket only carries ephemeral signals.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WsInbound {
    #[serde(rename = "typing.started")]
    TypingStarted { conversation_id: Uuid },
    #[serde(rename = "typing.stopped")]
    TypingStopped { conversation_id: Uuid },
}

/// `GET /api/v1/ws`, authenticated like every other route. The auth layer
/// accepts the token from the query string since browsers cannot set
/// headers on WebSocket requests.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: User,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, user.id, socket))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.attach(user_id, session_id, tx);
    tracing::debug!(%user_id, %session_id, "websocket session attached");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    // The registry dropped this channel: a reconnect
                    // displaced the session.
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<WsInbound>(&text) {
                            handle_inbound(&state, user_id, frame).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.registry.detach(user_id, session_id);
    tracing::debug!(%user_id, %session_id, "websocket session detached");
}

async fn handle_inbound(state: &AppState, user_id: Uuid, frame: WsInbound) {
    let (conversation_id, event) = match frame {
        WsInbound::TypingStarted { conversation_id } => {
            (conversation_id, ChatEvent::TypingStarted)
        }
        WsInbound::TypingStopped { conversation_id } => {
            (conversation_id, ChatEvent::TypingStopped)
        }
    };
    // Typing signals from non-members are dropped without a reply.
    let conversation = match state
        .conversations
        .ensure_participant(conversation_id, user_id)
        .await
    {
        Ok(conversation) => conversation,
        Err(_) => return,
    };
    let recipients: Vec<Uuid> = conversation
        .participants
        .iter()
        .copied()
        .filter(|p| *p != user_id)
        .collect();
    broadcast_event(
        &state.registry,
        state.fanout.as_ref(),
        &recipients,
        conversation_id,
        user_id,
        event,
    )
    .await;
}
