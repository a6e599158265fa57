use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use bookrate_core::services::ShelfUpdate;
use bookrate_core::{Shelf, Visibility};

use crate::error::ApiResult;
use crate::extract::{CurrentUser, MaybeUser};
use crate::state::AppState;

#[derive(Deserialize)]
struct NewShelfRequest {
    name: String,
    description: Option<String>,
    visibility: Option<Visibility>,
}

async fn list_shelves(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Shelf>>> {
    Ok(Json(state.services.shelves.list_own(&user).await?))
}

async fn create_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewShelfRequest>,
) -> ApiResult<(StatusCode, Json<Shelf>)> {
    let shelf = state
        .services
        .shelves
        .create_shelf(&user, req.name, req.description, req.visibility)
        .await?;
    Ok((StatusCode::CREATED, Json(shelf)))
}

async fn shelf_detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let (shelf, items) = state
        .services
        .shelves
        .shelf_detail(viewer.as_ref(), id)
        .await?;
    Ok(Json(json!({ "shelf": shelf, "items": items })))
}

async fn update_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ShelfUpdate>,
) -> ApiResult<Json<Shelf>> {
    Ok(Json(
        state.services.shelves.update_shelf(&user, id, update).await?,
    ))
}

async fn delete_shelf(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.shelves.delete_shelf(&user, id).await?;
    Ok(Json(json!({ "message": "shelf deleted" })))
}

async fn add_shelf_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((shelf_id, book_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let created = state
        .services
        .shelves
        .add_book(&user, shelf_id, book_id)
        .await?;
    if created {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "book added to shelf" })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "book already on shelf" })),
        ))
    }
}

async fn remove_shelf_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((shelf_id, book_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .services
        .shelves
        .remove_book(&user, shelf_id, book_id)
        .await?;
    Ok(Json(json!({ "message": "book removed from shelf" })))
}

async fn user_shelves(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<Shelf>>> {
    Ok(Json(
        state
            .services
            .shelves
            .list_for_username(viewer.as_ref(), &username)
            .await?,
    ))
}

#[derive(Deserialize)]
struct ProgressRequest {
    book_id: Uuid,
    page: Option<u32>,
    percent: Option<f64>,
    notes: Option<String>,
}

async fn list_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let progress = state.services.shelves.list_progress(&user).await?;
    Ok(Json(serde_json::to_value(progress)?))
}

async fn upsert_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ProgressRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let progress = state
        .services
        .shelves
        .upsert_progress(&user, req.book_id, req.page, req.percent, req.notes)
        .await?;
    Ok(Json(serde_json::to_value(progress)?))
}

async fn delete_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.services.shelves.delete_progress(&user, id).await?;
    Ok(Json(json!({ "message": "progress deleted" })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_shelves).post(create_shelf))
        .route("/progress", get(list_progress).post(upsert_progress))
        .route("/progress/:id", axum::routing::delete(delete_progress))
        .route("/users/:username", get(user_shelves))
        .route(
            "/:id",
            get(shelf_detail).put(update_shelf).delete(delete_shelf),
        )
        .route(
            "/:id/books/:book_id",
            post(add_shelf_book).delete(remove_shelf_book),
        )
}
