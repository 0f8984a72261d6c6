use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{direct_key, Conversation, ConversationSummary};
use crate::models::message::{rendered_content, NewMessage, ReplySnapshot, StoredMessage};
use crate::models::notification::NewNotification;
use crate::store::{ChatStore, LikeState};

/// How often an append retries after losing a (conversation_id, seq) race.
/// The row lock on the conversation makes collisions essentially impossible;
/// the retry covers writers that bypassed this service.
const APPEND_RETRIES: u32 = 3;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn participants_of(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn participants_by_conversation(
        &self,
        conversation_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT conversation_id, user_id FROM conversation_members \
             WHERE conversation_id = ANY($1) ORDER BY joined_at, user_id",
        )
        .bind(conversation_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in rows {
            let conversation_id: Uuid = row.get("conversation_id");
            map.entry(conversation_id).or_default().push(row.get("user_id"));
        }
        Ok(map)
    }

    async fn try_append(&self, new: &NewMessage) -> AppResult<StoredMessage> {
        let mut tx = self.pool.begin().await?;
        // The returning update takes the row lock that serializes appends
        // to this conversation and fuses the activity bump with the
        // sequence allocation.
        let seq: Option<i64> = sqlx::query_scalar(
            "UPDATE conversations SET last_seq = last_seq + 1, updated_at = NOW() \
             WHERE id = $1 RETURNING last_seq",
        )
        .bind(new.conversation_id)
        .fetch_optional(&mut *tx)
        .await?;
        let seq = match seq {
            Some(seq) => seq,
            None => {
                tx.rollback().await?;
                return Err(AppError::NotFound);
            }
        };

        let id = Uuid::new_v4();
        let reply = new.reply_to.as_ref();
        let row = sqlx::query(
            r#"INSERT INTO messages
                   (id, conversation_id, sender_id, seq, content,
                    reply_to_id, reply_to_label, reply_to_content)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING created_at"#,
        )
        .bind(id)
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(seq)
        .bind(&new.content)
        .bind(reply.map(|r| r.message_id))
        .bind(reply.map(|r| r.sender_label.as_str()))
        .bind(reply.map(|r| r.content.as_str()))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(StoredMessage {
            id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            seq,
            content: new.content.clone(),
            reply_to: new.reply_to.clone(),
            read_at: None,
            deleted_at: None,
            created_at,
        })
    }
}

fn message_from_row(row: &PgRow) -> StoredMessage {
    let reply_to_id: Option<Uuid> = row.get("reply_to_id");
    let reply_to_label: Option<String> = row.get("reply_to_label");
    let reply_to_content: Option<String> = row.get("reply_to_content");
    let reply_to = match (reply_to_id, reply_to_label, reply_to_content) {
        (Some(message_id), Some(sender_label), Some(content)) => Some(ReplySnapshot {
            message_id,
            sender_label,
            content,
        }),
        _ => None,
    };
    StoredMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        seq: row.get("seq"),
        content: row.get("content"),
        reply_to,
        read_at: row.get("read_at"),
        deleted_at: row.get("deleted_at"),
        created_at: row.get("created_at"),
    }
}

fn summary_from_row(row: &PgRow, participants: Vec<Uuid>) -> ConversationSummary {
    let last_content: Option<String> = row.get("last_content");
    let last_deleted: Option<bool> = row.get("last_deleted");
    ConversationSummary {
        id: row.get("id"),
        participants,
        last_message_preview: last_content
            .map(|content| rendered_content(&content, last_deleted.unwrap_or(false))),
        unread_count: row.get("unread_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SUMMARY_COLUMNS: &str = r#"
    c.id,
    c.created_at,
    c.updated_at,
    lm.content AS last_content,
    lm.deleted_at IS NOT NULL AS last_deleted,
    u.unread AS unread_count
"#;

const SUMMARY_LATERALS: &str = r#"
    LEFT JOIN LATERAL (
        SELECT m.content, m.deleted_at FROM messages m
        WHERE m.conversation_id = c.id
        ORDER BY m.seq DESC
        LIMIT 1
    ) lm ON TRUE
    LEFT JOIN LATERAL (
        SELECT COUNT(*) AS unread FROM messages m
        WHERE m.conversation_id = c.id
          AND m.sender_id <> $1
          AND m.seq > COALESCE((
              SELECT r.last_read_seq FROM read_marks r
              WHERE r.conversation_id = c.id AND r.user_id = $1
          ), 0)
    ) u ON TRUE
"#;

#[async_trait]
impl ChatStore for PgStore {
    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let key = direct_key(a, b);
        let candidate = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        // The unique index on direct_key is what makes concurrent
        // get-or-create for the same pair converge on one row.
        let inserted = sqlx::query(
            "INSERT INTO conversations (id, direct_key) VALUES ($1, $2) \
             ON CONFLICT (direct_key) DO NOTHING",
        )
        .bind(candidate)
        .bind(&key)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let id = if inserted == 1 {
            sqlx::query(
                "INSERT INTO conversation_members (conversation_id, user_id) \
                 VALUES ($1, $2), ($1, $3) ON CONFLICT DO NOTHING",
            )
            .bind(candidate)
            .bind(a)
            .bind(b)
            .execute(&mut *tx)
            .await?;
            candidate
        } else {
            sqlx::query_scalar("SELECT id FROM conversations WHERE direct_key = $1")
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?
        };
        tx.commit().await?;

        self.conversation(id).await?.ok_or(AppError::Internal)
    }

    async fn create_group(&self, participants: &[Uuid]) -> AppResult<Conversation> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO conversations (id) VALUES ($1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for user_id in participants {
            sqlx::query(
                "INSERT INTO conversation_members (conversation_id, user_id) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.conversation(id).await?.ok_or(AppError::Internal)
    }

    async fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, last_seq, created_at, updated_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let participants = self.participants_of(id).await?;
        Ok(Some(Conversation {
            id: row.get("id"),
            participants,
            last_seq: row.get("last_seq"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let sql = format!(
            r#"SELECT {SUMMARY_COLUMNS}
               FROM conversations c
               JOIN conversation_members me ON me.conversation_id = c.id AND me.user_id = $1
               {SUMMARY_LATERALS}
               ORDER BY c.updated_at DESC"#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        let mut members = self.participants_by_conversation(&ids).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                summary_from_row(row, members.remove(&id).unwrap_or_default())
            })
            .collect())
    }

    async fn summary_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ConversationSummary>> {
        let sql = format!(
            r#"SELECT {SUMMARY_COLUMNS}
               FROM conversations c
               {SUMMARY_LATERALS}
               WHERE c.id = $2"#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let participants = self.participants_of(conversation_id).await?;
        Ok(Some(summary_from_row(&row, participants)))
    }

    async fn append_message(&self, new: NewMessage) -> AppResult<StoredMessage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_append(&new).await {
                Err(AppError::Database(sqlx::Error::Database(e)))
                    if e.is_unique_violation() && attempt < APPEND_RETRIES =>
                {
                    tracing::debug!(
                        conversation_id = %new.conversation_id,
                        attempt,
                        "sequence collision on append, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn message(&self, id: Uuid) -> AppResult<Option<StoredMessage>> {
        let row = sqlx::query(
            r#"SELECT id, conversation_id, sender_id, seq, content,
                      reply_to_id, reply_to_label, reply_to_content,
                      read_at, deleted_at, created_at
               FROM messages WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: Option<i64>,
    ) -> AppResult<Vec<StoredMessage>> {
        let out = match limit {
            Some(n) => {
                let rows = sqlx::query(
                    r#"SELECT id, conversation_id, sender_id, seq, content,
                              reply_to_id, reply_to_label, reply_to_content,
                              read_at, deleted_at, created_at
                       FROM messages
                       WHERE conversation_id = $1
                       ORDER BY seq DESC
                       LIMIT $2"#,
                )
                .bind(conversation_id)
                .bind(n)
                .fetch_all(&self.pool)
                .await?;
                let mut out: Vec<StoredMessage> = rows.iter().map(message_from_row).collect();
                out.reverse();
                out
            }
            None => {
                let rows = sqlx::query(
                    r#"SELECT id, conversation_id, sender_id, seq, content,
                              reply_to_id, reply_to_label, reply_to_content,
                              read_at, deleted_at, created_at
                       FROM messages
                       WHERE conversation_id = $1
                       ORDER BY seq ASC"#,
                )
                .bind(conversation_id)
                .fetch_all(&self.pool)
                .await?;
                rows.iter().map(message_from_row).collect()
            }
        };
        Ok(out)
    }

    async fn advance_read_mark(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        // Lock the conversation row so a message committing concurrently is
        // either covered by this watermark or left for the next call.
        let newest: Option<i64> = sqlx::query_scalar(
            "SELECT last_seq FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(conversation_id)
        .fetch_optional(&mut *tx)
        .await?;
        let newest = match newest {
            Some(newest) => newest,
            None => {
                tx.rollback().await?;
                return Err(AppError::NotFound);
            }
        };
        if newest == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let advanced: Option<i64> = sqlx::query_scalar(
            r#"INSERT INTO read_marks (conversation_id, user_id, last_read_seq)
               VALUES ($1, $2, $3)
               ON CONFLICT (conversation_id, user_id) DO UPDATE
                   SET last_read_seq = EXCLUDED.last_read_seq, updated_at = NOW()
                   WHERE read_marks.last_read_seq < EXCLUDED.last_read_seq
               RETURNING last_read_seq"#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(newest)
        .fetch_optional(&mut *tx)
        .await?;

        match advanced {
            None => {
                tx.rollback().await?;
                Ok(None)
            }
            Some(mark) => {
                sqlx::query(
                    "UPDATE messages SET read_at = NOW() \
                     WHERE conversation_id = $1 AND sender_id <> $2 \
                       AND seq <= $3 AND read_at IS NULL",
                )
                .bind(conversation_id)
                .bind(reader_id)
                .bind(mark)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(Some(mark))
            }
        }
    }

    async fn add_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO message_likes (message_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        match result {
            Ok(r) => Ok(r.rows_affected() == 1),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                Err(AppError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let removed = sqlx::query(
            "DELETE FROM message_likes WHERE message_id = $1 AND user_id = $2",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed == 1)
    }

    async fn like_count(&self, message_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM message_likes WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn likes_for_messages(
        &self,
        message_ids: &[Uuid],
        viewer_id: Uuid,
    ) -> AppResult<HashMap<Uuid, LikeState>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"SELECT message_id,
                      COUNT(*)::bigint AS count,
                      BOOL_OR(user_id = $1) AS liked
               FROM message_likes
               WHERE message_id = ANY($2)
               GROUP BY message_id"#,
        )
        .bind(viewer_id)
        .bind(message_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        let mut out = HashMap::new();
        for row in rows {
            let message_id: Uuid = row.get("message_id");
            out.insert(
                message_id,
                LikeState {
                    count: row.get("count"),
                    liked_by_viewer: row.get("liked"),
                },
            );
        }
        Ok(out)
    }

    async fn mark_deleted(&self, message_id: Uuid) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE messages SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(message_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 1 {
            return Ok(true);
        }
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound),
        }
    }

    async fn record_notification(&self, new: NewNotification) -> AppResult<()> {
        sqlx::query(
            r#"INSERT INTO notifications (id, recipient_id, conversation_id, actor_id, preview)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.recipient_id)
        .bind(new.conversation_id)
        .bind(new.actor_id)
        .bind(&new.preview)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
