use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    "OK"
}

/// Create the HTTP server router
pub fn create_server(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .nest("/api/auth", handlers::auth::routes())
        .nest("/api/books", handlers::books::routes())
        .nest("/api/reviews", handlers::reviews::routes())
        .nest("/api/shelves", handlers::shelves::routes())
        .nest("/api/social", handlers::social::routes())
        .nest("/api/moderation", handlers::moderation::routes())
        .nest("/api/search", handlers::search::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = format!("0.0.0.0:{}", port);

    println!("🚀 HTTP server running on http://{}", addr);
    println!("💚 Health check: http://{}/healthz", addr);
    println!("📚 Books API:    http://{}/api/books", addr);
    println!("✍️  Reviews API:  http://{}/api/reviews", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
