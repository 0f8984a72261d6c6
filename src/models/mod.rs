pub mod conversation;
pub mod message;
pub mod notification;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile fields the chat service needs from the user service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name shown next to a message, falling back to the username.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Stand-in label when the profile can no longer be resolved.
pub fn fallback_label(user_id: Uuid) -> String {
    let id = user_id.to_string();
    format!("user-{}", &id[..8])
}
