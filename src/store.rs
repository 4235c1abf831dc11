//! Favorites and reading-progress store.
//!
//! Thin façade over [`Database`] enforcing the per-user access contract:
//! reads for an unauthenticated caller return the absent-record defaults
//! without touching the database, and writes are rejected with
//! [`AppError::AuthRequired`] before any I/O is attempted.

use crate::db::{Database, FavoriteEntry, ProgressEntry, User, doc_key, now_timestamp};
use crate::error::{AppError, Result};

/// Per-user favorites and progress, keyed by `"{user_id}_{book_id}"`.
#[derive(Clone)]
pub struct SyncStore {
    db: Database,
}

impl SyncStore {
    /// Create a store over the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Whether the user has favorited the book. Absent record or no session
    /// means false.
    pub fn favorite(&self, user: Option<&User>, book_id: &str) -> Result<bool> {
        let Some(user) = user else {
            return Ok(false);
        };

        Ok(self
            .db
            .get_favorite(&user.id, book_id)?
            .map(|entry| entry.is_favorite)
            .unwrap_or(false))
    }

    /// Set or clear the favorite flag. Idempotent.
    pub fn set_favorite(&self, user: Option<&User>, book_id: &str, value: bool) -> Result<()> {
        let user = user.ok_or(AppError::AuthRequired)?;

        self.db.save_favorite(&FavoriteEntry {
            doc_key: doc_key(&user.id, book_id),
            user_id: user.id.clone(),
            book_id: book_id.to_string(),
            is_favorite: value,
            updated_at: now_timestamp(),
        })
    }

    /// Last page the user reached in the book. Absent record or no session
    /// means None; callers treat that as page 1.
    pub fn progress(&self, user: Option<&User>, book_id: &str) -> Result<Option<u32>> {
        let Some(user) = user else {
            return Ok(None);
        };

        Ok(self
            .db
            .get_progress(&user.id, book_id)?
            .map(|entry| entry.page))
    }

    /// Record the user's current page. Overwrites any prior entry for the
    /// (user, book) key; last write wins.
    pub fn set_progress(
        &self,
        user: Option<&User>,
        book_id: &str,
        page: u32,
        source_url: &str,
    ) -> Result<()> {
        let user = user.ok_or(AppError::AuthRequired)?;

        self.db.save_progress(&ProgressEntry {
            doc_key: doc_key(&user.id, book_id),
            user_id: user.id.clone(),
            book_id: book_id.to_string(),
            page,
            source_url: source_url.to_string(),
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        })
    }

    /// List the user's active favorites for the dashboard.
    pub fn favorites_for(&self, user: &User) -> Result<Vec<FavoriteEntry>> {
        self.db.list_favorites(&user.id)
    }

    /// List the user's progress entries for the dashboard.
    pub fn progress_for(&self, user: &User) -> Result<Vec<ProgressEntry>> {
        self.db.list_progress(&user.id)
    }
}
