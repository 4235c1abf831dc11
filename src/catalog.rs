//! Book metadata catalog client.
//!
//! Wraps a volumes-style search API (Google Books shaped): free-text search,
//! single-volume lookup, and the curated/similar queries the front pages use.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Thumbnail shown when a catalog record carries no cover image.
const PLACEHOLDER_THUMBNAIL: &str = "https://via.placeholder.com/128x192";

/// A book identifier (ISBN and friends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Identifier type, e.g. "ISBN_10" or "ISBN_13".
    pub kind: String,
    /// Identifier value.
    pub value: String,
}

/// Book metadata as returned by the catalog. Read-only, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    /// Catalog volume ID.
    pub id: String,
    /// Book title.
    pub title: String,
    /// Authors, in catalog order.
    pub authors: Vec<String>,
    /// Description with HTML tags stripped.
    pub description: String,
    /// Cover thumbnail URL.
    pub thumbnail_url: String,
    /// Industry identifiers.
    pub identifiers: Vec<Identifier>,
    /// Subject categories, in catalog order.
    pub categories: Vec<String>,
}

impl BookRecord {
    /// Display string for the author list.
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    /// Open Library permalink derived from the first ISBN identifier.
    pub fn openlibrary_url(&self) -> Option<String> {
        self.identifiers
            .iter()
            .find(|i| i.kind == "ISBN_10" || i.kind == "ISBN_13")
            .map(|i| format!("https://openlibrary.org/isbn/{}", i.value))
    }
}

/// Client for the volumes metadata API.
#[derive(Clone)]
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a new client with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        tracing::debug!(base_url = %base_url, "creating catalog client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Free-text search.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
        order_by: Option<&str>,
    ) -> Result<Vec<BookRecord>> {
        let mut url = format!(
            "{}?q={}&maxResults={}",
            self.url("volumes"),
            urlencoding::encode(query),
            max_results
        );
        if let Some(order) = order_by {
            url = format!("{}&orderBy={}", url, urlencoding::encode(order));
        }

        tracing::debug!(%url, "GET volumes");
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let list: VolumeList = resp.json().await?;

        Ok(list
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(Volume::into_record)
            .collect())
    }

    /// Get a single volume by ID.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn volume(&self, id: &str) -> Result<BookRecord> {
        let url = self.url(&format!("volumes/{}", urlencoding::encode(id)));
        tracing::debug!(%url, "GET volume");

        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(id.to_string()));
        }
        let resp = resp.error_for_status()?;
        let volume: Volume = resp.json().await?;

        volume
            .into_record()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// Curated home feed: popular novels, most relevant first.
    pub async fn curated(&self, max_results: u32) -> Result<Vec<BookRecord>> {
        self.search("subject:novels fiction", max_results, Some("relevance"))
            .await
    }

    /// Books sharing a subject category, for "similar titles" suggestions.
    pub async fn similar(&self, category: &str, max_results: u32) -> Result<Vec<BookRecord>> {
        self.search(&format!("subject:{}", category), max_results, None)
            .await
    }
}

/// Strip HTML tags from catalog descriptions for plain-text display.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

// ========== WIRE TYPES ==========

#[derive(Debug, Deserialize)]
struct VolumeList {
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: Option<String>,
    #[serde(rename = "volumeInfo")]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    image_links: Option<ImageLinks>,
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
    categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

impl Volume {
    fn into_record(self) -> Option<BookRecord> {
        let id = self.id?;
        let info = self.volume_info.unwrap_or_default();

        Some(BookRecord {
            id,
            title: info.title.unwrap_or_else(|| "No Title".to_string()),
            authors: info.authors.unwrap_or_default(),
            description: strip_html(
                &info
                    .description
                    .unwrap_or_else(|| "No description available.".to_string()),
            ),
            thumbnail_url: info
                .image_links
                .and_then(|l| l.thumbnail)
                .unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string()),
            identifiers: info
                .industry_identifiers
                .unwrap_or_default()
                .into_iter()
                .map(|i| Identifier {
                    kind: i.kind,
                    value: i.identifier,
                })
                .collect(),
            categories: info.categories.unwrap_or_default(),
        })
    }
}
