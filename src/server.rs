//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let catalog_routes = Router::new()
        .route("/search", get(handlers::catalog_search))
        .route("/curated", get(handlers::catalog_curated))
        .route("/{id}", get(handlers::catalog_volume))
        .route("/{id}/similar", get(handlers::catalog_similar));

    let book_routes = Router::new().route("/{id}/resolve", get(handlers::resolve_book));

    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_login))
        .route("/register", post(handlers::auth_register))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me));

    let sync_routes = Router::new()
        .route("/favorite/{book_id}", get(handlers::sync_get_favorite))
        .route("/favorite/{book_id}", put(handlers::sync_set_favorite))
        .route("/progress/{book_id}", get(handlers::sync_get_progress))
        .route("/progress/{book_id}", put(handlers::sync_set_progress));

    let reader_routes = Router::new()
        .route("/{book_id}/open", post(handlers::reader_open))
        .route("/{book_id}/close", post(handlers::reader_close))
        .route("/{book_id}/page/{page}", get(handlers::reader_page));

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/dashboard", get(handlers::dashboard))
        .nest("/api/catalog", catalog_routes)
        .nest("/api/books", book_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/sync", sync_routes)
        .nest("/api/reader", reader_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
