use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use bookrate_core::services::ProfileUpdate;

use super::UserOut;
use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    /// Username or email address.
    identifier: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let (user, _token) = state
        .services
        .accounts
        .register(&req.username, &req.email, &req.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserOut::from(&user) })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (user, session) = state
        .services
        .accounts
        .login(&req.identifier, &req.password)
        .await?;
    Ok(Json(json!({
        "token": session.token,
        "expires_at": session.expires_at,
        "user": UserOut::from(&user),
    })))
}

async fn logout(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.services.accounts.logout(token).await?;
    }
    Ok(Json(json!({ "message": "logged out" })))
}

async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state.services.accounts.verify_email(&token).await?;
    Ok(Json(json!({
        "message": "email verified",
        "user": UserOut::from(&user),
    })))
}

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let profile = state
        .services
        .accounts
        .get_profile(user.id.expect("authenticated user has id"))
        .await?;
    Ok(Json(json!({
        "user": UserOut::from(&user),
        "profile": profile,
    })))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let profile = state
        .services
        .accounts
        .update_profile(user.id.expect("authenticated user has id"), update)
        .await?;
    Ok(Json(json!({ "profile": profile })))
}

async fn user_detail(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let detail = state.services.accounts.user_detail(&username).await?;
    Ok(Json(json!({
        "user": UserOut::from(&detail.user),
        "profile": detail.profile,
        "review_count": detail.review_count,
        "follower_count": detail.follower_count,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/verify/:token", get(verify_email))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/users/:username", get(user_detail))
}
