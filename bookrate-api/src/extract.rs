use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use bookrate_core::{CoreError, User};

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Extractor for endpoints requiring an authenticated user.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            ApiError(CoreError::Unauthorized(
                "missing bearer token".to_string(),
            ))
        })?;
        let user = state
            .services
            .accounts
            .current_user(token)
            .await?
            .ok_or_else(|| {
                ApiError(CoreError::Unauthorized(
                    "invalid or expired session".to_string(),
                ))
            })?;
        Ok(CurrentUser(user))
    }
}

/// Extractor for endpoints where authentication is optional.
pub struct MaybeUser(pub Option<User>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match bearer_token(parts) {
            Some(token) => state.services.accounts.current_user(token).await?,
            None => None,
        };
        Ok(MaybeUser(user))
    }
}

/// Extractor for moderator-only endpoints.
pub struct Moderator(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for Moderator {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_moderator() {
            return Err(ApiError(CoreError::Forbidden(
                "moderator role required".to_string(),
            )));
        }
        Ok(Moderator(user))
    }
}
