use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{fallback_label, Profile};

/// Read-side port onto the user service's profile data. Conversation
/// creation validates every participant through this; reply snapshots use
/// it to label the quoted sender.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn lookup(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
}

/// Directory over the shared `users` table.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantDirectory for PgDirectory {
    async fn lookup(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        let row = sqlx::query("SELECT username, display_name, avatar_url FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Profile {
            username: r.get("username"),
            display_name: r.get("display_name"),
            avatar_url: r.get("avatar_url"),
        }))
    }
}

/// In-memory directory for dev mode and the hermetic tests. Permissive
/// mode resolves unknown ids to a generated profile so the service runs
/// without a seeded user base; strict mode answers only for seeded users.
pub struct StaticDirectory {
    users: RwLock<HashMap<Uuid, Profile>>,
    permissive: bool,
}

impl StaticDirectory {
    pub fn strict() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            permissive: false,
        }
    }

    pub fn permissive() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            permissive: true,
        }
    }

    pub async fn insert(&self, user_id: Uuid, profile: Profile) {
        self.users.write().await.insert(user_id, profile);
    }
}

#[async_trait]
impl ParticipantDirectory for StaticDirectory {
    async fn lookup(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        if let Some(profile) = self.users.read().await.get(&user_id) {
            return Ok(Some(profile.clone()));
        }
        if self.permissive {
            return Ok(Some(Profile {
                username: fallback_label(user_id),
                display_name: None,
                avatar_url: None,
            }));
        }
        Ok(None)
    }
}
