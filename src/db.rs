use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub async fn init_pool(config: &Config) -> AppResult<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is not set".into()))?;
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}
