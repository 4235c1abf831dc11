use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Favorites table, one document per (user, book) key
            CREATE TABLE IF NOT EXISTS favorites (
                doc_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Reading progress table, one document per (user, book) key
            CREATE TABLE IF NOT EXISTS progress (
                doc_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                page INTEGER NOT NULL,
                source_url TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id);
            CREATE INDEX IF NOT EXISTS idx_progress_user ON progress(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, display_name, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.display_name,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::InvalidInput(format!("Account '{}' already exists", user.email))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get a user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, display_name, created_at, last_login
             FROM users WHERE email = ?1",
            params![email],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get a user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, display_name, created_at, last_login
             FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            display_name: row.get(3)?,
            created_at: row.get(4)?,
            last_login: row.get(5)?,
        })
    }

    /// Update the last-login timestamp.
    pub fn update_user_last_login(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Update a user's password hash. Returns false if the user does not exist.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                params![password_hash, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(changed > 0)
    }

    /// Delete a user by email. Returns false if the user does not exist.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM users WHERE email = ?1", params![email])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(changed > 0)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, email, password_hash, display_name, created_at, last_login
                 FROM users ORDER BY email",
            )
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?;

        Ok(users)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create a session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get a session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete a session by token.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    // ========== FAVORITE OPERATIONS ==========

    /// Save or update a favorite flag. Idempotent per (user, book) key.
    pub fn save_favorite(&self, entry: &FavoriteEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO favorites (doc_key, user_id, book_id, is_favorite, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (doc_key) DO UPDATE SET
                is_favorite = excluded.is_favorite,
                updated_at = excluded.updated_at",
            params![
                entry.doc_key,
                entry.user_id,
                entry.book_id,
                entry.is_favorite,
                entry.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save favorite: {}", e)))?;
        Ok(())
    }

    /// Get the favorite entry for a (user, book) pair.
    pub fn get_favorite(&self, user_id: &str, book_id: &str) -> Result<Option<FavoriteEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT doc_key, user_id, book_id, is_favorite, updated_at
             FROM favorites WHERE doc_key = ?1",
            params![doc_key(user_id, book_id)],
            Self::row_to_favorite,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get favorite: {}", e)))
    }

    /// List a user's active favorites.
    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT doc_key, user_id, book_id, is_favorite, updated_at
                 FROM favorites WHERE user_id = ?1 AND is_favorite = 1
                 ORDER BY updated_at DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to list favorites: {}", e)))?;

        let entries = stmt
            .query_map(params![user_id], Self::row_to_favorite)
            .map_err(|e| AppError::Internal(format!("Failed to list favorites: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AppError::Internal(format!("Failed to list favorites: {}", e)))?;

        Ok(entries)
    }

    fn row_to_favorite(row: &rusqlite::Row<'_>) -> rusqlite::Result<FavoriteEntry> {
        Ok(FavoriteEntry {
            doc_key: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            is_favorite: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Save or update reading progress. Overwrites write every field they
    /// carry; the original created_at is preserved.
    pub fn save_progress(&self, entry: &ProgressEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO progress (doc_key, user_id, book_id, page, source_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (doc_key) DO UPDATE SET
                page = excluded.page,
                source_url = excluded.source_url,
                created_at = COALESCE(progress.created_at, excluded.created_at),
                updated_at = excluded.updated_at",
            params![
                entry.doc_key,
                entry.user_id,
                entry.book_id,
                entry.page,
                entry.source_url,
                entry.created_at,
                entry.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save progress: {}", e)))?;
        Ok(())
    }

    /// Get the progress entry for a (user, book) pair.
    pub fn get_progress(&self, user_id: &str, book_id: &str) -> Result<Option<ProgressEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT doc_key, user_id, book_id, page, source_url, created_at, updated_at
             FROM progress WHERE doc_key = ?1",
            params![doc_key(user_id, book_id)],
            Self::row_to_progress,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get progress: {}", e)))
    }

    /// List a user's progress entries, most recently read first.
    pub fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT doc_key, user_id, book_id, page, source_url, created_at, updated_at
                 FROM progress WHERE user_id = ?1
                 ORDER BY updated_at DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?;

        let entries = stmt
            .query_map(params![user_id], Self::row_to_progress)
            .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?;

        Ok(entries)
    }

    fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressEntry> {
        Ok(ProgressEntry {
            doc_key: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            page: row.get(3)?,
            source_url: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}
