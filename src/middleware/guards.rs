//! Extractors that make authentication explicit in handler signatures.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// The authenticated caller, as established by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware; absence means the route was wired
        // outside the authenticated tree.
        let id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .ok_or(AppError::Unauthorized)?;
        Ok(User { id })
    }
}
