mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Email address used for login.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Per-user favorite flag for a book.
///
/// Stored under the composite document key `"{user_id}_{book_id}"`; only the
/// owning user's session ever writes that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteEntry {
    /// Composite document key.
    pub doc_key: String,
    /// User ID.
    pub user_id: String,
    /// Book ID in the metadata catalog.
    pub book_id: String,
    /// Whether the book is currently favorited.
    pub is_favorite: bool,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Per-user last-read page for a book.
///
/// Last-write-wins; at most one entry exists per (user, book) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Composite document key.
    pub doc_key: String,
    /// User ID.
    pub user_id: String,
    /// Book ID in the metadata catalog.
    pub book_id: String,
    /// Last page reached, starting at 1.
    pub page: u32,
    /// Source URL of the rendition being read.
    pub source_url: String,
    /// First write timestamp (preserved across overwrites).
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Build the composite document key for per-user per-book records.
pub fn doc_key(user_id: &str, book_id: &str) -> String {
    format!("{}_{}", user_id, book_id)
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
