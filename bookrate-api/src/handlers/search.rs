use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use bookrate_core::services::SearchScope;
use bookrate_core::{BookFilter, BookSort};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    #[serde(rename = "type")]
    scope: Option<String>,
    genre: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    language: Option<String>,
    year: Option<i32>,
    min_rating: Option<f64>,
    max_rating: Option<f64>,
    sort: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let scope = SearchScope::parse(query.scope.as_deref().unwrap_or("all"));
    let filter = BookFilter {
        genre_slug: query.genre,
        author_slug: query.author,
        publisher_slug: query.publisher,
        tag_slug: None,
        language: query.language,
        year: query.year,
        min_rating: query.min_rating,
        max_rating: query.max_rating,
        sort: match query.sort.as_deref() {
            Some("rating") => BookSort::Rating,
            Some("date") => BookSort::Date,
            Some("title") => BookSort::Title,
            _ => BookSort::Relevance,
        },
        limit: None,
        offset: None,
    };
    let results = state
        .services
        .search
        .search(query.q.as_deref().unwrap_or(""), scope, filter)
        .await?;
    Ok(Json(serde_json::to_value(results)?))
}

#[derive(Debug, Default, Deserialize)]
struct AutocompleteQuery {
    q: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn autocomplete(
    State(state): State<AppState>,
    Query(query): Query<AutocompleteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let suggestions = state
        .services
        .search
        .autocomplete(
            query.q.as_deref().unwrap_or(""),
            query.kind.as_deref().unwrap_or("books"),
        )
        .await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search))
        .route("/autocomplete", get(autocomplete))
}
