use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use bookrate_core::services::{BookUpdate, NewAuthor, NewBook, NewEdition, NewGenre, NewPublisher, NewTag};
use bookrate_core::{Book, BookFilter, BookSort};

use crate::error::ApiResult;
use crate::extract::Moderator;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct BookListQuery {
    genre: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    tag: Option<String>,
    language: Option<String>,
    year: Option<i32>,
    min_rating: Option<f64>,
    max_rating: Option<f64>,
    sort: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl BookListQuery {
    fn into_filter(self) -> BookFilter {
        BookFilter {
            genre_slug: self.genre,
            author_slug: self.author,
            publisher_slug: self.publisher,
            tag_slug: self.tag,
            language: self.language,
            year: self.year,
            min_rating: self.min_rating,
            max_rating: self.max_rating,
            sort: match self.sort.as_deref() {
                Some("rating") => BookSort::Rating,
                Some("date") => BookSort::Date,
                Some("title") => BookSort::Title,
                _ => BookSort::Relevance,
            },
            limit: Some(self.limit.unwrap_or(20).min(100)),
            offset: self.offset,
        }
    }
}

async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookListQuery>,
) -> ApiResult<Json<Vec<Book>>> {
    let books = state
        .services
        .catalog
        .list_books(&query.into_filter())
        .await?;
    Ok(Json(books))
}

async fn create_book(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Json(input): Json<NewBook>,
) -> ApiResult<(StatusCode, Json<Book>)> {
    let book = state.services.catalog.create_book(input).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn book_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let detail = state.services.catalog.book_detail(&slug).await?;
    Ok(Json(serde_json::to_value(detail)?))
}

async fn update_book(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Path(slug): Path<String>,
    Json(update): Json<BookUpdate>,
) -> ApiResult<Json<Book>> {
    let book = state.services.catalog.update_book(&slug, update).await?;
    Ok(Json(book))
}

async fn create_edition(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Path(slug): Path<String>,
    Json(input): Json<NewEdition>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let edition = state.services.catalog.create_edition(&slug, input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(edition)?)))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_authors(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let authors = state
        .services
        .catalog
        .list_authors(Some(page.limit.unwrap_or(50).min(200)), page.offset)
        .await?;
    Ok(Json(serde_json::to_value(authors)?))
}

async fn create_author(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Json(input): Json<NewAuthor>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let author = state.services.catalog.create_author(input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(author)?)))
}

async fn author_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (author, books) = state.services.catalog.author_detail(&slug).await?;
    Ok(Json(json!({ "author": author, "books": books })))
}

async fn list_genres(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let genres = state.services.catalog.list_genres().await?;
    Ok(Json(serde_json::to_value(genres)?))
}

async fn create_genre(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Json(input): Json<NewGenre>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let genre = state.services.catalog.create_genre(input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(genre)?)))
}

async fn genre_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (genre, books) = state.services.catalog.genre_detail(&slug).await?;
    Ok(Json(json!({ "genre": genre, "books": books })))
}

async fn list_publishers(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let publishers = state.services.catalog.list_publishers().await?;
    Ok(Json(serde_json::to_value(publishers)?))
}

async fn create_publisher(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Json(input): Json<NewPublisher>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let publisher = state.services.catalog.create_publisher(input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(publisher)?)))
}

async fn publisher_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (publisher, books) = state.services.catalog.publisher_detail(&slug).await?;
    Ok(Json(json!({ "publisher": publisher, "books": books })))
}

async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let tags = state.services.catalog.list_tags().await?;
    Ok(Json(serde_json::to_value(tags)?))
}

async fn create_tag(
    State(state): State<AppState>,
    Moderator(_moderator): Moderator,
    Json(input): Json<NewTag>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let tag = state.services.catalog.create_tag(input).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(tag)?)))
}

async fn tag_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (tag, books) = state.services.catalog.tag_detail(&slug).await?;
    Ok(Json(json!({ "tag": tag, "books": books })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/authors", get(list_authors).post(create_author))
        .route("/authors/:slug", get(author_detail))
        .route("/genres", get(list_genres).post(create_genre))
        .route("/genres/:slug", get(genre_detail))
        .route("/publishers", get(list_publishers).post(create_publisher))
        .route("/publishers/:slug", get(publisher_detail))
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/:slug", get(tag_detail))
        .route("/:slug", get(book_detail).put(update_book))
        .route("/:slug/editions", post(create_edition))
}
