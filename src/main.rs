use std::sync::Arc;

use matchday_chat::config::Config;
use matchday_chat::error::AppError;
use matchday_chat::services::directory::{ParticipantDirectory, PgDirectory, StaticDirectory};
use matchday_chat::state::AppState;
use matchday_chat::store::{ChatStore, MemStore, PgStore};
use matchday_chat::websocket::pubsub::{spawn_listener, Fanout};
use matchday_chat::websocket::SessionRegistry;
use matchday_chat::{db, logging, migrations, routes};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    // Pick the storage backend. Without DATABASE_URL the instance runs on
    // the in-memory store; nothing survives a restart.
    let (store, directory): (Arc<dyn ChatStore>, Arc<dyn ParticipantDirectory>) =
        match cfg.database_url.as_deref() {
            Some(_) => {
                let pool = db::init_pool(&cfg)
                    .await
                    .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

                // Run embedded migrations (idempotent)
                // Treat migration failures as fatal - the database schema must be in sync
                migrations::run_all(&pool).await.map_err(|e| {
                    AppError::StartServer(format!("database migrations failed: {e}"))
                })?;

                (
                    Arc::new(PgStore::new(pool.clone())),
                    Arc::new(PgDirectory::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using the in-memory store");
                (
                    Arc::new(MemStore::new()),
                    Arc::new(StaticDirectory::permissive()),
                )
            }
        };

    let registry = SessionRegistry::new();

    // Cross-instance fanout is optional; a single instance works without it.
    let fanout = match cfg.redis_url.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url)
                .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;
            let fanout = Fanout::new(client);
            spawn_listener(fanout.clone(), registry.clone());
            Some(fanout)
        }
        None => {
            tracing::info!("REDIS_URL not set; cross-instance fanout disabled");
            None
        }
    };

    let state = AppState::new(cfg.clone(), store, directory, registry, fanout);
    let app = routes::build_router(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting matchday-chat");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(format!("serve: {e}")))?;

    Ok(())
}
