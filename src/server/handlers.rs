//! HTTP request handlers.

use crate::catalog::BookRecord;
use crate::db::{self, doc_key};
use crate::error::{AppError, Result};
use crate::reader::{ReaderState, ReadingFlow, RenderedPage};
use crate::resolver::ResolvedSource;
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Html,
};
use serde::{Deserialize, Serialize};

/// Similar titles suggested when resolution falls back to a substitute.
const SIMILAR_BOOKS_COUNT: u32 = 3;

// ============================================================================
// WEB PAGES
// ============================================================================

/// Index page (simple HTML).
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; padding: 0 1rem; }}
        h1 {{ color: #333; }}
        a {{ color: #0066cc; }}
        code {{ background: #e8e8e8; padding: 0.2rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>&#128218; {title}</h1>
    <p>Discover your next great read.</p>
    <h2>API</h2>
    <ul>
        <li><code>GET /api/catalog/search?q=...</code> search books</li>
        <li><code>GET /api/catalog/curated</code> popular novels</li>
        <li><code>GET /api/books/&lt;id&gt;/resolve</code> find a free PDF</li>
        <li><code>GET /api/dashboard</code> favorites and reading progress</li>
    </ul>
</body>
</html>"#,
        title = state.config.server.title,
    );

    Html(html)
}

// ============================================================================
// CATALOG API
// ============================================================================

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
    max_results: Option<u32>,
    order_by: Option<String>,
}

/// Free-text catalog search.
pub async fn catalog_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<BookRecord>>> {
    let max = params.max_results.unwrap_or(state.config.catalog.max_results);
    let books = state
        .catalog
        .search(&params.q, max, params.order_by.as_deref())
        .await?;

    Ok(Json(books))
}

/// Curated home feed.
pub async fn catalog_curated(State(state): State<AppState>) -> Result<Json<Vec<BookRecord>>> {
    let books = state
        .catalog
        .curated(state.config.catalog.max_results)
        .await?;

    Ok(Json(books))
}

/// Book detail payload.
#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    /// Catalog record.
    #[serde(flatten)]
    pub book: BookRecord,
    /// Open Library permalink, when an ISBN is known.
    pub openlibrary_url: Option<String>,
    /// Whether the requesting user has favorited this book.
    pub is_favorite: bool,
}

/// Single volume by ID, with the caller's favorite flag.
pub async fn catalog_volume(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<VolumeResponse>> {
    let book = state.catalog.volume(&id).await?;
    let user = optional_user(&state, &headers);
    let is_favorite = state.store.favorite(user.as_ref(), &id)?;

    Ok(Json(VolumeResponse {
        openlibrary_url: book.openlibrary_url(),
        book,
        is_favorite,
    }))
}

/// Similar-titles query parameters.
#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    max_results: Option<u32>,
}

/// Books sharing the volume's first category.
pub async fn catalog_similar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<BookRecord>>> {
    let book = state.catalog.volume(&id).await?;
    let category = book
        .categories
        .first()
        .map(String::as_str)
        .unwrap_or("fiction");

    let books = state
        .catalog
        .similar(category, params.max_results.unwrap_or(SIMILAR_BOOKS_COUNT))
        .await?;

    Ok(Json(books))
}

// ============================================================================
// SOURCE RESOLUTION
// ============================================================================

/// Resolution result for a book.
#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    /// Resolved reading source.
    #[serde(flatten)]
    pub source: ResolvedSource,
    /// Warning shown when the source is a substitute classic.
    pub warning: Option<String>,
    /// Similar titles to explore when the requested book has no free rendition.
    pub similar: Vec<BookRecord>,
}

/// Locate a free PDF rendition for a book.
///
/// Runs the provider waterfall exactly once per request; when it falls back
/// to a substitute classic, the response carries a warning and similar
/// titles from the book's category.
pub async fn resolve_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResolveResponse>> {
    let book = state.catalog.volume(&id).await?;
    let category = book.categories.first().map(String::as_str);

    let source = state.resolver.resolve(&book.title, category).await;

    let (warning, similar) = if source.is_authentic {
        (None, Vec::new())
    } else {
        let similar = state
            .catalog
            .similar(category.unwrap_or("fiction"), SIMILAR_BOOKS_COUNT)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to fetch similar books");
                Vec::new()
            });

        let warning = format!(
            "A free e-book for \"{}\" is not available due to copyright. Try this free classic instead, or explore more below!",
            book.title
        );
        (Some(warning), similar)
    };

    Ok(Json(ResolveResponse {
        source,
        warning,
        similar,
    }))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Login redirect parameters.
#[derive(Debug, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user_id: String,
    email: String,
    /// Where the client should navigate after login.
    redirect_to: String,
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        email: user.email,
        redirect_to: params.return_to.unwrap_or_else(|| "/dashboard".to_string()),
    }))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let _user = state.auth.register(&req.email, &req.password)?;
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        email: user.email,
        redirect_to: params.return_to.unwrap_or_else(|| "/dashboard".to_string()),
    }))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::OK)
}

/// Get current user info.
pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<db::User>> {
    let user = get_authenticated_user(&state, &headers)?;
    Ok(Json(user))
}

// ============================================================================
// SYNC API
// ============================================================================

/// Favorite flag payload.
#[derive(Debug, Deserialize, Serialize)]
pub struct FavoriteBody {
    is_favorite: bool,
}

/// Get the favorite flag for a book. Unauthenticated callers get false.
pub async fn sync_get_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<FavoriteBody>> {
    let user = optional_user(&state, &headers);
    let is_favorite = state.store.favorite(user.as_ref(), &book_id)?;

    Ok(Json(FavoriteBody { is_favorite }))
}

/// Set the favorite flag for a book.
pub async fn sync_set_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(body): Json<FavoriteBody>,
) -> Result<StatusCode> {
    let user = optional_user(&state, &headers);
    state
        .store
        .set_favorite(user.as_ref(), &book_id, body.is_favorite)?;

    Ok(StatusCode::OK)
}

/// Progress payload.
#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    page: u32,
    source_url: String,
}

/// Progress response.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    /// Last page reached, if any progress was recorded.
    page: Option<u32>,
}

/// Get the saved page for a book. Unauthenticated callers get null.
pub async fn sync_get_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<ProgressResponse>> {
    let user = optional_user(&state, &headers);
    let page = state.store.progress(user.as_ref(), &book_id)?;

    Ok(Json(ProgressResponse { page }))
}

/// Record the current page for a book.
pub async fn sync_set_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> Result<StatusCode> {
    let user = optional_user(&state, &headers);
    state
        .store
        .set_progress(user.as_ref(), &book_id, body.page, &body.source_url)?;

    Ok(StatusCode::OK)
}

/// A book the user is reading, with their position in it.
#[derive(Debug, Serialize)]
pub struct ReadingItem {
    /// Catalog record.
    #[serde(flatten)]
    pub book: BookRecord,
    /// Last page reached.
    pub current_page: u32,
}

/// Dashboard payload: favorites and books in progress.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    /// Favorited books.
    pub favorites: Vec<BookRecord>,
    /// Books with reading progress, most recently read first.
    pub reading: Vec<ReadingItem>,
}

/// Aggregate the user's favorites and reading progress with catalog records.
pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>> {
    let user = get_authenticated_user(&state, &headers)?;

    let mut favorites = Vec::new();
    for entry in state.store.favorites_for(&user)? {
        match state.catalog.volume(&entry.book_id).await {
            Ok(book) => favorites.push(book),
            Err(e) => tracing::warn!(book = %entry.book_id, error = %e, "skipping favorite"),
        }
    }

    let mut reading = Vec::new();
    for entry in state.store.progress_for(&user)? {
        match state.catalog.volume(&entry.book_id).await {
            Ok(book) => reading.push(ReadingItem {
                book,
                current_page: entry.page,
            }),
            Err(e) => tracing::warn!(book = %entry.book_id, error = %e, "skipping progress entry"),
        }
    }

    Ok(Json(DashboardResponse { favorites, reading }))
}

// ============================================================================
// READER API
// ============================================================================

/// Reader open parameters. Without an explicit URL the source is resolved.
#[derive(Debug, Default, Deserialize)]
pub struct ReaderOpenParams {
    source_url: Option<String>,
}

/// Reader session snapshot.
#[derive(Debug, Serialize)]
pub struct ReaderResponse {
    /// Total pages in the document.
    pub total_pages: u32,
    /// Page the reader is on.
    pub current_page: u32,
    /// Source URL being read.
    pub source_url: String,
    /// False when the source is a substitute classic.
    pub is_authentic: bool,
}

/// Open (or reopen) a reader session for a book.
///
/// Reading requires a signed-in user; the session resumes at the saved page.
/// Reopening replaces any stale session for the same (user, book) pair.
pub async fn reader_open(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Query(params): Query<ReaderOpenParams>,
) -> Result<Json<ReaderResponse>> {
    let user = get_authenticated_user(&state, &headers)?;

    let (url, is_authentic) = match params.source_url {
        Some(url) => (url, true),
        None => {
            let book = state.catalog.volume(&book_id).await?;
            let category = book.categories.first().map(String::as_str);
            let source = state.resolver.resolve(&book.title, category).await;
            let url = source.url.ok_or_else(|| {
                AppError::NotFound(format!("no readable source for book {}", book_id))
            })?;
            (url, source.is_authentic)
        }
    };

    let key = doc_key(&user.id, &book_id);
    let mut flow = ReadingFlow::for_user(state.store.clone(), Some(user), &book_id);
    flow.open(&state.loader, &url).await?;
    // First draw of the resume page; persists it as current progress.
    flow.render_pending()?;

    let response = ReaderResponse {
        total_pages: flow.reader().total_pages(),
        current_page: flow.reader().current_page(),
        source_url: url,
        is_authentic,
    };

    state.insert_reader(key, flow);
    Ok(Json(response))
}

/// Navigate to a page and return its rendered content.
pub async fn reader_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((book_id, page)): Path<(String, u32)>,
) -> Result<Json<RenderedPage>> {
    let user = get_authenticated_user(&state, &headers)?;
    let key = doc_key(&user.id, &book_id);

    let rendered = state
        .with_reader(&key, |flow| {
            if let ReaderState::Error(message) = flow.reader().state() {
                return Err(AppError::Render(message.clone()));
            }
            if !flow.go_to_page(page) {
                return Err(AppError::InvalidInput(format!(
                    "page {} out of range 1..={}",
                    page,
                    flow.reader().total_pages()
                )));
            }
            flow.render_pending()
        })
        .ok_or_else(|| AppError::NotFound(format!("no open reader for book {}", book_id)))??;

    rendered
        .map(Json)
        .ok_or_else(|| AppError::Internal("no page pending after navigation".to_string()))
}

/// Close a reader session.
pub async fn reader_close(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers)?;
    state.remove_reader(&doc_key(&user.id, &book_id));
    Ok(StatusCode::OK)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Get authenticated user from token, or fail with the auth-required signal.
fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    extract_token(headers)
        .and_then(|token| state.auth.validate_token(&token).ok().flatten())
        .ok_or(AppError::AuthRequired)
}

/// Get the user for requests where authentication is optional. A missing,
/// invalid, or expired token reads as "not signed in".
fn optional_user(state: &AppState, headers: &HeaderMap) -> Option<db::User> {
    extract_token(headers).and_then(|token| state.auth.validate_token(&token).ok().flatten())
}
