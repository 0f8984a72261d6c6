use sqlx::{Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_001: &str = include_str!("../migrations/001_create_users.sql");
const MIG_002: &str = include_str!("../migrations/002_create_conversations.sql");
const MIG_003: &str = include_str!("../migrations/003_create_messages.sql");
const MIG_004: &str = include_str!("../migrations/004_create_read_marks.sql");
const MIG_005: &str = include_str!("../migrations/005_create_message_likes.sql");
const MIG_006: &str = include_str!("../migrations/006_create_notifications.sql");

pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    // Each file is one batch and may hold several statements; raw_sql uses
    // the simple query protocol, which allows that.
    for (i, sql) in [MIG_001, MIG_002, MIG_003, MIG_004, MIG_005, MIG_006]
        .into_iter()
        .enumerate()
    {
        let label = i + 1;
        match sqlx::raw_sql(sql).execute(db).await {
            Ok(_) => tracing::info!(migration = %label, "migration applied"),
            Err(e) => {
                tracing::warn!(migration = %label, error = %e, "migration may have been applied already")
            }
        }
    }
    Ok(())
}
