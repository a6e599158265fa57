use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use bookrate_core::services::{NewComment, NewReview, ReviewUpdate};
use bookrate_core::storage::ReviewFilter;
use bookrate_core::{Comment, Review};

use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct ReviewListQuery {
    book: Option<Uuid>,
    user: Option<Uuid>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewListQuery>,
) -> ApiResult<Json<Vec<Review>>> {
    let filter = ReviewFilter {
        book_id: query.book,
        user_id: query.user,
        only_public: true,
        limit: Some(query.limit.unwrap_or(20).min(100)),
        offset: query.offset,
    };
    Ok(Json(state.services.reviews.list_reviews(&filter).await?))
}

async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<NewReview>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let review = state.services.reviews.create_review(&user, input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn review_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Review>> {
    Ok(Json(state.services.reviews.get_review(id).await?))
}

async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ReviewUpdate>,
) -> ApiResult<Json<Review>> {
    Ok(Json(
        state.services.reviews.update_review(&user, id, update).await?,
    ))
}

async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.reviews.delete_review(&user, id).await?;
    Ok(Json(json!({ "message": "review deleted" })))
}

async fn review_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let revisions = state.services.reviews.list_revisions(&user, id).await?;
    Ok(Json(serde_json::to_value(revisions)?))
}

async fn like_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let created = state.services.reviews.like_review(&user, id).await?;
    if created {
        Ok((StatusCode::CREATED, Json(json!({ "message": "liked" }))))
    } else {
        Ok((StatusCode::OK, Json(json!({ "message": "already liked" }))))
    }
}

async fn unlike_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.reviews.unlike_review(&user, id).await?;
    Ok(Json(json!({ "message": "unliked" })))
}

#[derive(Debug, Deserialize)]
struct CommentListQuery {
    review: Uuid,
}

async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(
        state.services.reviews.list_comments(query.review).await?,
    ))
}

async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<NewComment>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state.services.reviews.create_comment(&user, input).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, Deserialize)]
struct CommentUpdate {
    body: String,
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<CommentUpdate>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(
        state
            .services
            .reviews
            .update_comment(&user, id, update.body)
            .await?,
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.reviews.delete_comment(&user, id).await?;
    Ok(Json(json!({ "message": "comment deleted" })))
}

async fn like_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let created = state.services.reviews.like_comment(&user, id).await?;
    if created {
        Ok((StatusCode::CREATED, Json(json!({ "message": "liked" }))))
    } else {
        Ok((StatusCode::OK, Json(json!({ "message": "already liked" }))))
    }
}

async fn unlike_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.reviews.unlike_comment(&user, id).await?;
    Ok(Json(json!({ "message": "unliked" })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/comments", get(list_comments).post(create_comment))
        .route(
            "/comments/:id",
            get(comment_detail).put(update_comment).delete(delete_comment),
        )
        .route(
            "/comments/:id/like",
            post(like_comment).delete(unlike_comment),
        )
        .route(
            "/:id",
            get(review_detail).put(update_review).delete(delete_review),
        )
        .route("/:id/history", get(review_history))
        .route("/:id/like", post(like_review).delete(unlike_review))
}

async fn comment_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(state.services.reviews.get_comment(id).await?))
}
