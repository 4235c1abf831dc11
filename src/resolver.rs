//! Free e-book source resolution.
//!
//! Turns a book title into a downloadable PDF URL by asking a prioritized
//! list of open-content catalogs, falling back to a fixed table of
//! public-domain classics when no legitimate rendition exists.

mod providers;

pub use providers::{GutendexProvider, OpenLibraryProvider, StandardEbooksProvider};

use crate::config::SourcesConfig;
use async_trait::async_trait;
use rand::RngExt;
use serde::{Deserialize, Serialize};

/// Outcome of a source resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Download URL of a PDF rendition, if one was found.
    pub url: Option<String>,
    /// False when the URL is a substitute classic, not the requested book.
    pub is_authentic: bool,
}

/// A single open-content catalog that may know a free PDF for a title.
///
/// Implementations are queried in priority order and must not touch any
/// store; a failed lookup is indistinguishable from an empty one at the
/// resolver boundary.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Try to find a PDF download URL for the given title.
    async fn try_resolve(&self, title: &str) -> crate::error::Result<Option<String>>;
}

/// Lowercase a title and join its words with `+` for search queries.
pub fn normalize_query(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("+")
}

/// Known-public-domain Gutenberg PDFs, keyed by genre.
const FALLBACK_SOURCES: &[(&str, &[&str])] = &[
    (
        "fiction",
        &[
            "https://www.gutenberg.org/ebooks/1342/files/1342-pdf.pdf", // Pride and Prejudice
            "https://www.gutenberg.org/ebooks/84/files/84-pdf.pdf",     // Frankenstein
            "https://www.gutenberg.org/ebooks/5200/files/5200-pdf.pdf", // Metamorphosis
        ],
    ),
    (
        "novel",
        &[
            "https://www.gutenberg.org/ebooks/174/files/174-pdf.pdf", // The Picture of Dorian Gray
            "https://www.gutenberg.org/ebooks/11/files/11-pdf.pdf",   // Alice's Adventures in Wonderland
        ],
    ),
    (
        "middle grade",
        &[
            "https://www.gutenberg.org/ebooks/5670/files/5670-pdf.pdf", // The Secret Garden
            "https://www.gutenberg.org/ebooks/514/files/514-pdf.pdf",   // Little Women
        ],
    ),
];

/// Candidate fallback URLs for a genre, degrading to "middle grade" then
/// "fiction" when the genre has no table entry. Never empty.
fn fallback_candidates(category: &str) -> &'static [&'static str] {
    let category = category.to_lowercase();
    for key in [category.as_str(), "middle grade", "fiction"] {
        if let Some(&(_, urls)) = FALLBACK_SOURCES.iter().find(|(k, _)| *k == key) {
            return urls;
        }
    }
    &[]
}

/// Resolves book titles to free PDF sources via an ordered provider list.
pub struct Resolver {
    providers: Vec<Box<dyn SourceProvider>>,
}

impl Resolver {
    /// Create a resolver with an explicit provider list, highest priority first.
    pub fn new(providers: Vec<Box<dyn SourceProvider>>) -> Self {
        Self { providers }
    }

    /// Create a resolver with the standard provider waterfall.
    pub fn with_default_providers(sources: &SourcesConfig) -> Self {
        let client = reqwest::Client::new();
        Self::new(vec![
            Box::new(OpenLibraryProvider::new(
                &sources.open_library_url,
                client.clone(),
            )),
            Box::new(GutendexProvider::new(&sources.gutendex_url, client.clone())),
            Box::new(StandardEbooksProvider::new(
                &sources.standard_ebooks_url,
                client,
            )),
        ])
    }

    /// Resolve a title to a reading source.
    ///
    /// Providers are attempted exactly once each, in order, stopping at the
    /// first hit. A provider failure is logged and treated as "no result";
    /// the waterfall itself never errors. When every provider comes up empty
    /// the result is a uniformly random pick from the fallback table for
    /// `category_hint` (default "fiction"), flagged as not authentic.
    pub async fn resolve(&self, title: &str, category_hint: Option<&str>) -> ResolvedSource {
        for provider in &self.providers {
            match provider.try_resolve(title).await {
                Ok(Some(url)) => {
                    tracing::debug!(provider = provider.name(), %url, "resolved free PDF");
                    return ResolvedSource {
                        url: Some(url),
                        is_authentic: true,
                    };
                }
                Ok(None) => {
                    tracing::debug!(provider = provider.name(), "no match");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "source failed, skipping");
                }
            }
        }

        let category = category_hint.unwrap_or("fiction");
        let candidates = fallback_candidates(category);
        let url = if candidates.is_empty() {
            None
        } else {
            let pick = rand::rng().random_range(0..candidates.len());
            Some(candidates[pick].to_string())
        };

        tracing::info!(%title, category, "no free rendition found, substituting a classic");
        ResolvedSource {
            url,
            is_authentic: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("Pride and Prejudice"), "pride+and+prejudice");
        assert_eq!(normalize_query("  Moby   Dick "), "moby+dick");
        assert_eq!(normalize_query("Emma"), "emma");
    }

    #[test]
    fn test_fallback_degradation_order() {
        let fiction = fallback_candidates("fiction");
        assert_eq!(fiction.len(), 3);

        let novel = fallback_candidates("Novel");
        assert_eq!(novel.len(), 2);

        // Unknown genre degrades to "middle grade"
        let unknown = fallback_candidates("biography");
        assert_eq!(unknown, fallback_candidates("middle grade"));
    }
}
