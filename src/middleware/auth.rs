use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The participant id.
    pub sub: String,
    /// Expiration time (unix timestamp).
    pub exp: i64,
}

/// Mints an HS256 bearer token for the given user.
pub fn issue_token(user_id: Uuid, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal)
}

/// Validates signature and expiry and extracts the claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Middleware to extract the bearer token and add the caller's id to
/// request extensions. Browser WebSocket clients cannot set headers, so a
/// `token` query parameter is accepted as a fallback.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .or_else(|| query_token(&req))
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(&token, &state.config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::BadRequest("invalid user id in token".into()))?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn query_token(req: &Request) -> Option<String> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, "secret", Duration::minutes(5)).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), "secret", Duration::minutes(5)).unwrap();
        let err = verify_token(&token, "other-secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Past the default validation leeway.
        let token = issue_token(Uuid::new_v4(), "secret", Duration::minutes(-5)).unwrap();
        let err = verify_token(&token, "secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn query_token_is_extracted_from_ws_style_uris() {
        let req = Request::builder()
            .uri("/api/v1/ws?token=abc.def.ghi")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(query_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = Request::builder()
            .uri("/api/v1/ws")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(query_token(&req), None);
    }
}
