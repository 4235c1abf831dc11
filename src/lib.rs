//! elibrary-rs: A lightweight e-library server with free e-book resolution
//! and reading sync.
//!
//! This crate fronts a public book-metadata catalog and a set of
//! open-content sources: users browse and search books, locate a free PDF
//! rendition through a prioritized source waterfall, and read page by page
//! with per-user favorites and reading-progress persistence.
//!
//! # Features
//!
//! - Book search and metadata via a volumes-style catalog API
//! - Free PDF resolution across Open Library, Gutendex and Standard Ebooks,
//!   with public-domain fallbacks by genre
//! - User accounts and token authentication
//! - Per-user favorites and last-read-page sync
//! - Server-side PDF reader with resumable page navigation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and session state.
pub mod auth;
/// Book metadata catalog client.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// PDF reader and progress flow.
pub mod reader;
/// Free e-book source resolution.
pub mod resolver;
/// HTTP server.
pub mod server;
/// Favorites and progress store.
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
