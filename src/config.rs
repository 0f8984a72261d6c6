use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the process runs on the in-memory store (dev and tests).
    pub database_url: Option<String>,
    /// Unset disables cross-instance fanout; delivery stays instance-local.
    pub redis_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.trim().is_empty() {
            return Err(crate::error::AppError::Config("JWT_SECRET empty".into()));
        }
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            redis_url,
            port,
            jwt_secret,
            db_max_connections,
        })
    }

    /// Defaults used by the test suites and local tooling.
    pub fn test_defaults() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            port: 3000,
            jwt_secret: "test-secret".into(),
            db_max_connections: 5,
        }
    }
}
