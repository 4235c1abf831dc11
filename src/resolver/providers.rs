//! Built-in open-content source providers.

use super::{SourceProvider, normalize_query};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const PDF_MIME: &str = "application/pdf";

/// Open Library full-text search: accepts the first public-access doc that
/// exposes a PDF download link.
pub struct OpenLibraryProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OpenLibraryProvider {
    /// Create a provider against the given Open Library base URL.
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenLibrarySearch {
    #[serde(default)]
    docs: Vec<OpenLibraryDoc>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryDoc {
    ebook_access: Option<String>,
    formats: Option<HashMap<String, String>>,
}

#[async_trait]
impl SourceProvider for OpenLibraryProvider {
    fn name(&self) -> &'static str {
        "open-library"
    }

    async fn try_resolve(&self, title: &str) -> Result<Option<String>> {
        // The normalized query is already URL-safe; `+` here means a space.
        let url = format!("{}/search.json?q={}", self.base_url, normalize_query(title));
        tracing::debug!(%url, "GET search");

        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let search: OpenLibrarySearch = resp.json().await?;

        Ok(search
            .docs
            .into_iter()
            .filter(|doc| doc.ebook_access.as_deref() == Some("public"))
            .find_map(|doc| doc.formats.and_then(|mut f| f.remove(PDF_MIME))))
    }
}

/// Gutendex (Project Gutenberg index) search-by-title: accepts the first
/// result that exposes a PDF link.
pub struct GutendexProvider {
    base_url: String,
    client: reqwest::Client,
}

impl GutendexProvider {
    /// Create a provider against the given Gutendex base URL.
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GutendexSearch {
    #[serde(default)]
    results: Vec<GutendexBook>,
}

#[derive(Debug, Deserialize)]
struct GutendexBook {
    #[serde(default)]
    formats: HashMap<String, String>,
}

#[async_trait]
impl SourceProvider for GutendexProvider {
    fn name(&self) -> &'static str {
        "gutendex"
    }

    async fn try_resolve(&self, title: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/books?search={}",
            self.base_url,
            urlencoding::encode(&normalize_query(title))
        );
        tracing::debug!(%url, "GET books");

        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let search: GutendexSearch = resp.json().await?;

        Ok(search
            .results
            .into_iter()
            .find_map(|mut book| book.formats.remove(PDF_MIME)))
    }
}

/// Standard Ebooks static catalog manifest: accepts the first entry whose
/// title contains the query title, case-insensitively.
pub struct StandardEbooksProvider {
    manifest_url: String,
    client: reqwest::Client,
}

impl StandardEbooksProvider {
    /// Create a provider against the given manifest URL.
    pub fn new(manifest_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StandardEbook {
    title: String,
    #[serde(default)]
    downloads: HashMap<String, String>,
}

#[async_trait]
impl SourceProvider for StandardEbooksProvider {
    fn name(&self) -> &'static str {
        "standard-ebooks"
    }

    async fn try_resolve(&self, title: &str) -> Result<Option<String>> {
        tracing::debug!(url = %self.manifest_url, "GET manifest");

        let resp = self
            .client
            .get(&self.manifest_url)
            .send()
            .await?
            .error_for_status()?;
        let catalog: Vec<StandardEbook> = resp.json().await?;

        let needle = title.to_lowercase();
        Ok(catalog
            .into_iter()
            .filter(|book| book.title.to_lowercase().contains(&needle))
            .find_map(|mut book| book.downloads.remove(PDF_MIME)))
    }
}
