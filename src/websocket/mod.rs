use std::collections::HashMap;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod pubsub;

struct LiveSession {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
}

enum Command {
    Attach {
        user_id: Uuid,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<Message>,
    },
    Detach {
        user_id: Uuid,
        session_id: Uuid,
    },
    Deliver {
        recipients: Vec<Uuid>,
        payload: String,
        reply: oneshot::Sender<Vec<Uuid>>,
    },
}

/// Routing table of live WebSocket sessions, at most one per user. The map
/// is owned by a single task and mutated only through its command queue, so
/// no lock is ever held across a socket send.
#[derive(Clone)]
pub struct SessionRegistry {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// Registers the user's current session, displacing any previous one.
    pub fn attach(&self, user_id: Uuid, session_id: Uuid, sender: mpsc::UnboundedSender<Message>) {
        let _ = self.tx.send(Command::Attach {
            user_id,
            session_id,
            tx: sender,
        });
    }

    /// Removes the session only if it is still the registered one, so a
    /// stale socket closing after a reconnect cannot tear down the
    /// replacement session.
    pub fn detach(&self, user_id: Uuid, session_id: Uuid) {
        let _ = self.tx.send(Command::Detach {
            user_id,
            session_id,
        });
    }

    /// Pushes the payload to every recipient with a live session and
    /// returns the recipients that had none. If the registry task is gone,
    /// everyone is reported offline and delivery degrades to persistence
    /// plus notifications.
    pub async fn deliver(&self, recipients: &[Uuid], payload: String) -> Vec<Uuid> {
        let (reply, response) = oneshot::channel();
        let cmd = Command::Deliver {
            recipients: recipients.to_vec(),
            payload,
            reply,
        };
        if self.tx.send(cmd).is_err() {
            return recipients.to_vec();
        }
        response.await.unwrap_or_else(|_| recipients.to_vec())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut sessions: HashMap<Uuid, LiveSession> = HashMap::new();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Attach {
                user_id,
                session_id,
                tx,
            } => {
                sessions.insert(user_id, LiveSession { session_id, tx });
            }
            Command::Detach {
                user_id,
                session_id,
            } => {
                if sessions
                    .get(&user_id)
                    .is_some_and(|s| s.session_id == session_id)
                {
                    sessions.remove(&user_id);
                }
            }
            Command::Deliver {
                recipients,
                payload,
                reply,
            } => {
                let mut offline = Vec::new();
                for user_id in recipients {
                    match sessions.get(&user_id) {
                        Some(session) => {
                            if session.tx.send(Message::Text(payload.clone())).is_err() {
                                sessions.remove(&user_id);
                                offline.push(user_id);
                            }
                        }
                        None => offline.push(user_id),
                    }
                }
                let _ = reply.send(offline);
            }
        }
        crate::metrics::set_live_sessions(sessions.len() as i64);
    }
}
