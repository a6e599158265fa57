use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use bookrate_api::server::create_server;
use bookrate_api::state::AppState;
use bookrate_core::services::{NewAuthor, NewBook};
use bookrate_core::storage::{InMemoryStorage, Storage};
use bookrate_core::Role;

struct TestApp {
    router: Router,
    state: AppState,
    storage: Arc<dyn Storage>,
}

fn test_app() -> TestApp {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let state = AppState::new(storage.clone());
    TestApp {
        router: create_server(state.clone()),
        state,
        storage,
    }
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

/// Register and log in a user, returning the bearer token.
async fn signup(app: &TestApp, name: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "correcthorse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "identifier": name, "password": "correcthorse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

/// Seed a book directly through the catalog service.
async fn seed_book(app: &TestApp, title: &str) -> (String, String) {
    let book = app
        .state
        .services
        .catalog
        .create_book(NewBook {
            title: title.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    (book.id.unwrap().to_string(), book.slug)
}

async fn promote_to_moderator(app: &TestApp, username: &str) {
    let mut user = app
        .storage
        .get_user_by_username(username)
        .await
        .unwrap()
        .unwrap();
    user.role = Role::Moderator;
    app.storage.update_user(&user).await.unwrap();
}

#[tokio::test]
async fn health_check_works() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = test_app();
    let token = signup(&app, "alice").await;

    let (status, body) = send(&app, "GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    // the password hash must never appear in a response
    assert!(body["user"].get("password_hash").is_none());

    let (status, _) = send(
        &app,
        "PUT",
        "/api/auth/profile",
        Some(&token),
        Some(json!({ "bio": "I read a lot" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/api/auth/users/alice", None, None).await;
    assert_eq!(body["profile"]["bio"], "I read a lot");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = test_app();
    signup(&app, "alice").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "other@example.com",
            "password": "correcthorse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn review_lifecycle_updates_book_aggregates() {
    let app = test_app();
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let (book_id, book_slug) = seed_book(&app, "Dune").await;

    // unauthenticated creation is rejected
    let (status, _) = send(
        &app,
        "POST",
        "/api/reviews",
        None,
        Some(json!({ "book_id": book_id, "title": "t", "body_md": "b" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, review) = send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({
            "book_id": book_id,
            "title": "A landmark",
            "body_md": "Slow start.\n\nGreat ending.",
            "rating": 4.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["body_html"], "<p>Slow start.</p><p>Great ending.</p>");

    let (status, _) = send(
        &app,
        "POST",
        "/api/reviews",
        Some(&bob),
        Some(json!({
            "book_id": book_id,
            "title": "Also great",
            "body_md": "text",
            "rating": 5.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // aggregates are visible on the book detail
    let (status, body) = send(&app, "GET", &format!("/api/books/{book_slug}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["review_count"], 2);
    assert_eq!(body["book"]["rating_count"], 2);
    assert_eq!(body["book"]["avg_rating"], 4.5);

    // one review per user and book
    let (status, _) = send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({ "book_id": book_id, "title": "Again", "body_md": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn likes_and_comments_flow() {
    let app = test_app();
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let (book_id, _) = seed_book(&app, "Dune").await;

    let (_, review) = send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({ "book_id": book_id, "title": "A landmark", "body_md": "text" })),
    )
    .await;
    let review_id = review["id"].as_str().unwrap().to_string();

    // like twice: created, then already-liked
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/reviews/{review_id}/like"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/reviews/{review_id}/like"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = send(&app, "GET", &format!("/api/reviews/{review_id}"), None, None).await;
    assert_eq!(detail["like_count"], 1);

    // comment and check the count
    let (status, comment) = send(
        &app,
        "POST",
        "/api/reviews/comments",
        Some(&bob),
        Some(json!({ "review_id": review_id, "body": "Agreed." })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = send(&app, "GET", &format!("/api/reviews/{review_id}"), None, None).await;
    assert_eq!(detail["comment_count"], 1);

    // alice got notifications for the like and the comment
    let (_, notifications) = send(
        &app,
        "GET",
        "/api/social/notifications",
        Some(&alice),
        None,
    )
    .await;
    let kinds: Vec<&str> = notifications
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"review_like"));
    assert!(kinds.contains(&"review_comment"));

    // deleting own comment refreshes the count
    let comment_id = comment["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/reviews/comments/{comment_id}"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, detail) = send(&app, "GET", &format!("/api/reviews/{review_id}"), None, None).await;
    assert_eq!(detail["comment_count"], 0);
}

#[tokio::test]
async fn shelves_are_created_at_registration_and_track_books() {
    let app = test_app();
    let alice = signup(&app, "alice").await;
    let (book_id, _) = seed_book(&app, "Dune").await;

    let (status, shelves) = send(&app, "GET", "/api/shelves", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shelves.as_array().unwrap().len(), 3);

    let shelf_id = shelves[0]["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/shelves/{shelf_id}/books/{book_id}"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = send(
        &app,
        "GET",
        &format!("/api/shelves/{shelf_id}"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(detail["shelf"]["book_count"], 1);
    assert_eq!(detail["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn follow_and_feed() {
    let app = test_app();
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let (book_id, _) = seed_book(&app, "Dune").await;

    let alice_user = app
        .storage
        .get_user_by_username("alice")
        .await
        .unwrap()
        .unwrap();

    // bob follows alice
    let (status, _) = send(
        &app,
        "POST",
        "/api/social/follow",
        Some(&bob),
        Some(json!({
            "target_type": "user",
            "target_id": alice_user.id.unwrap().to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // alice writes a review; it lands in bob's feed and notifications
    send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({ "book_id": book_id, "title": "Fresh", "body_md": "text" })),
    )
    .await;

    let (_, feed) = send(&app, "GET", "/api/social/feed", Some(&bob), None).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
    assert_eq!(feed[0]["title"], "Fresh");

    let (_, count) = send(
        &app,
        "GET",
        "/api/social/notifications/unread-count",
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(count["unread"], 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/social/notifications/read-all",
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, count) = send(
        &app,
        "GET",
        "/api/social/notifications/unread-count",
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(count["unread"], 0);
}

#[tokio::test]
async fn moderation_requires_role_and_hides_content() {
    let app = test_app();
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let (book_id, book_slug) = seed_book(&app, "Dune").await;

    let (_, review) = send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({ "book_id": book_id, "title": "Spam", "body_md": "buy pills", "rating": 5.0 })),
    )
    .await;
    let review_id = review["id"].as_str().unwrap().to_string();

    // anyone can report
    let (status, report) = send(
        &app,
        "POST",
        "/api/moderation/reports",
        Some(&bob),
        Some(json!({
            "target_type": "review",
            "target_id": review_id,
            "reason": "spam",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let report_id = report["id"].as_str().unwrap().to_string();

    // but listing is moderator-only
    let (status, _) = send(&app, "GET", "/api/moderation/reports", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let moderator = signup(&app, "moddy").await;
    promote_to_moderator(&app, "moddy").await;

    let (status, reports) = send(
        &app,
        "GET",
        "/api/moderation/reports?status=pending",
        Some(&moderator),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().unwrap().len(), 1);

    let (status, resolved) = send(
        &app,
        "POST",
        &format!("/api/moderation/reports/{report_id}/resolve"),
        Some(&moderator),
        Some(json!({ "action": "hide", "note": "obvious spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");

    // the hidden review no longer counts toward the book
    let (_, body) = send(&app, "GET", &format!("/api/books/{book_slug}"), None, None).await;
    assert_eq!(body["book"]["review_count"], 0);
    assert_eq!(body["book"]["rating_count"], 0);

    let (_, actions) = send(&app, "GET", "/api/moderation/actions", Some(&moderator), None).await;
    assert_eq!(actions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn search_spans_books_authors_and_reviews() {
    let app = test_app();
    let alice = signup(&app, "alice").await;

    let author = app
        .state
        .services
        .catalog
        .create_author(NewAuthor {
            name: "Frank Herbert".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let book = app
        .state
        .services
        .catalog
        .create_book(NewBook {
            title: "Dune".to_string(),
            author_slugs: vec![author.slug],
            ..Default::default()
        })
        .await
        .unwrap();

    send(
        &app,
        "POST",
        "/api/reviews",
        Some(&alice),
        Some(json!({
            "book_id": book.id.unwrap().to_string(),
            "title": "Sandworms",
            "body_md": "All about Arrakis",
        })),
    )
    .await;

    let (status, results) = send(&app, "GET", "/api/search?q=dune", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["books"].as_array().unwrap().len(), 1);
    assert_eq!(results["reviews"].as_array().unwrap().len(), 1);

    let (status, suggestions) = send(
        &app,
        "GET",
        "/api/search/autocomplete?q=du&type=books",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suggestions["suggestions"][0]["text"], "Dune");
}
