use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use bookrate_core::services::CollectionUpdate;
use bookrate_core::{Collection, ContentKind, ContentRef, Review, Visibility};

use crate::error::ApiResult;
use crate::extract::{CurrentUser, MaybeUser};
use crate::state::AppState;

#[derive(Deserialize)]
struct FollowRequest {
    target_type: String,
    target_id: Uuid,
}

impl FollowRequest {
    fn target(&self) -> Result<ContentRef, bookrate_core::CoreError> {
        Ok(ContentRef::new(
            ContentKind::parse(&self.target_type)?,
            self.target_id,
        ))
    }
}

async fn follow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<FollowRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let created = state.services.social.follow(&user, req.target()?).await?;
    if created {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "followed successfully" })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "already following" })),
        ))
    }
}

async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<FollowRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.social.unfollow(&user, req.target()?).await?;
    Ok(Json(json!({ "message": "unfollowed successfully" })))
}

#[derive(Debug, Default, Deserialize)]
struct NotificationQuery {
    unread: Option<bool>,
    limit: Option<usize>,
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let notifications = state
        .services
        .social
        .list_notifications(
            &user,
            query.unread.unwrap_or(false),
            Some(query.limit.unwrap_or(50).min(200)),
        )
        .await?;
    Ok(Json(serde_json::to_value(notifications)?))
}

async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.services.social.unread_count(&user).await?;
    Ok(Json(json!({ "unread": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.social.mark_read(&user, id).await?;
    Ok(Json(json!({ "message": "notification marked as read" })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.social.mark_all_read(&user).await?;
    Ok(Json(json!({ "message": "all notifications marked as read" })))
}

#[derive(Deserialize)]
struct NewCollectionRequest {
    name: String,
    description: Option<String>,
    visibility: Option<Visibility>,
}

async fn list_collections(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> ApiResult<Json<Vec<Collection>>> {
    Ok(Json(
        state.services.social.list_collections(viewer.as_ref()).await?,
    ))
}

async fn create_collection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewCollectionRequest>,
) -> ApiResult<(StatusCode, Json<Collection>)> {
    let collection = state
        .services
        .social
        .create_collection(&user, req.name, req.description, req.visibility)
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

async fn collection_detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let (collection, items) = state
        .services
        .social
        .collection_detail(viewer.as_ref(), id)
        .await?;
    Ok(Json(json!({ "collection": collection, "items": items })))
}

async fn update_collection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<CollectionUpdate>,
) -> ApiResult<Json<Collection>> {
    Ok(Json(
        state
            .services
            .social
            .update_collection(&user, id, update)
            .await?,
    ))
}

async fn delete_collection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.social.delete_collection(&user, id).await?;
    Ok(Json(json!({ "message": "collection deleted" })))
}

#[derive(Debug, Default, Deserialize)]
struct CollectionItemRequest {
    notes: Option<String>,
}

async fn add_collection_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((collection_id, book_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<CollectionItemRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let notes = body.and_then(|Json(b)| b.notes);
    let created = state
        .services
        .social
        .add_book(&user, collection_id, book_id, notes)
        .await?;
    if created {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "book added to collection" })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "book already in collection" })),
        ))
    }
}

async fn remove_collection_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((collection_id, book_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .services
        .social
        .remove_book(&user, collection_id, book_id)
        .await?;
    Ok(Json(json!({ "message": "book removed from collection" })))
}

async fn feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.services.social.feed(&user).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/follow", post(follow).delete(unfollow))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_read))
        .route("/collections", get(list_collections).post(create_collection))
        .route(
            "/collections/:id",
            get(collection_detail)
                .put(update_collection)
                .delete(delete_collection),
        )
        .route(
            "/collections/:id/books/:book_id",
            post(add_collection_book).delete(remove_collection_book),
        )
        .route("/feed", get(feed))
}
