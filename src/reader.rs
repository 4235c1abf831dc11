//! PDF reader with page navigation and progress persistence.
//!
//! The reader is a small state machine: `Idle` until a source URL is known,
//! `Loading` while the document is fetched and parsed, `Ready` once the page
//! count and the saved page are known, `Rendering` while a page draw is
//! outstanding, and `Error` (terminal for that URL) when parsing or drawing
//! fails.
//!
//! All async entry points are plain futures; dropping one at screen teardown
//! abandons the in-flight work, so a stale completion can never be applied.

use crate::auth::SessionContext;
use crate::db::User;
use crate::error::{AppError, Result};
use crate::store::SyncStore;
use async_trait::async_trait;

/// Message surfaced when a document cannot be parsed or drawn.
const RENDER_FAILED_MESSAGE: &str = "Failed to load PDF. Please try another book.";

/// Reader lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// No source URL set.
    Idle,
    /// Fetching and parsing the document.
    Loading,
    /// Document open, no draw outstanding.
    Ready,
    /// A page draw is outstanding.
    Rendering,
    /// Parsing or drawing failed; terminal for this URL.
    Error(String),
}

/// A drawn page.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RenderedPage {
    /// Page number, starting at 1.
    pub number: u32,
    /// Extracted page text, the drawable surface of this reader.
    pub text: String,
}

/// Page-level access to an open document.
pub trait PageRenderer: Send {
    /// Total number of pages.
    fn page_count(&self) -> u32;

    /// Draw a single page.
    fn render_page(&mut self, page: u32) -> Result<RenderedPage>;
}

/// Fetches a source URL and opens it as a renderable document.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document behind `url`.
    async fn load(&self, url: &str) -> Result<Box<dyn PageRenderer>>;
}

/// PDF document renderer backed by lopdf.
pub struct LopdfRenderer {
    doc: lopdf::Document,
}

impl LopdfRenderer {
    /// Parse a PDF from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::Render(e.to_string()))?;
        Ok(Self { doc })
    }
}

impl PageRenderer for LopdfRenderer {
    fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    fn render_page(&mut self, page: u32) -> Result<RenderedPage> {
        let text = self
            .doc
            .extract_text(&[page])
            .map_err(|e| AppError::Render(e.to_string()))?;

        Ok(RenderedPage { number: page, text })
    }
}

/// Loader that fetches documents over HTTP and parses them with lopdf.
#[derive(Clone)]
pub struct HttpDocumentLoader {
    client: reqwest::Client,
}

impl HttpDocumentLoader {
    /// Create a loader with its own HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, url: &str) -> Result<Box<dyn PageRenderer>> {
        tracing::debug!(%url, "fetching document");
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;

        Ok(Box::new(LopdfRenderer::from_bytes(&bytes)?))
    }
}

/// Page-navigation state machine over an open document.
pub struct Reader {
    state: ReaderState,
    renderer: Option<Box<dyn PageRenderer>>,
    source_url: Option<String>,
    total_pages: u32,
    current_page: u32,
    pending: Option<u32>,
}

impl Reader {
    /// Create an idle reader.
    pub fn new() -> Self {
        Self {
            state: ReaderState::Idle,
            renderer: None,
            source_url: None,
            total_pages: 0,
            current_page: 1,
            pending: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// Currently displayed page.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Total pages of the open document.
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Source URL of the open document.
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Open a document, resuming at `saved_page` (default 1, clamped to the
    /// document). Leaves the reader in `Rendering` with the resume page
    /// queued for the first draw, or `Error` if the document cannot be
    /// parsed.
    pub async fn open<L>(&mut self, loader: &L, url: &str, saved_page: Option<u32>) -> Result<()>
    where
        L: DocumentLoader + ?Sized,
    {
        self.state = ReaderState::Loading;
        self.source_url = Some(url.to_string());
        self.renderer = None;
        self.pending = None;

        match loader.load(url).await {
            Ok(renderer) => {
                self.total_pages = renderer.page_count();
                self.current_page = saved_page.unwrap_or(1).clamp(1, self.total_pages.max(1));
                self.renderer = Some(renderer);
                self.pending = Some(self.current_page);
                self.state = ReaderState::Rendering;
                Ok(())
            }
            Err(e) => {
                self.state = ReaderState::Error(RENDER_FAILED_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// Request a page. No-op (returns false) when the page is out of
    /// `[1, total_pages]` or no document is open.
    ///
    /// At most one draw is outstanding: requesting a page while a previous
    /// request has not been drawn supersedes it, and the latest requested
    /// page wins when the surface is next drawn.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        if self.renderer.is_none() || matches!(self.state, ReaderState::Error(_)) {
            return false;
        }
        if page < 1 || page > self.total_pages {
            return false;
        }

        self.current_page = page;
        self.pending = Some(page);
        self.state = ReaderState::Rendering;
        true
    }

    /// Draw the latest requested page, if any.
    ///
    /// Returns the drawn page and moves back to `Ready`; a draw failure
    /// moves to `Error`. Superseded requests are never drawn.
    pub fn render_pending(&mut self) -> Result<Option<RenderedPage>> {
        let Some(page) = self.pending.take() else {
            return Ok(None);
        };

        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| AppError::Render("no document open".to_string()))?;

        match renderer.render_page(page) {
            Ok(rendered) => {
                self.current_page = page;
                self.state = ReaderState::Ready;
                Ok(Some(rendered))
            }
            Err(e) => {
                self.state = ReaderState::Error(RENDER_FAILED_MESSAGE.to_string());
                Err(e)
            }
        }
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a reading flow gets its current user from.
enum Identity {
    /// A user resolved once, e.g. from a request token.
    Fixed(Option<User>),
    /// The live session context of a single-user embedder.
    Context(SessionContext),
}

/// Couples a [`Reader`] with progress persistence.
///
/// Every successfully drawn page is recorded via the store for authenticated
/// sessions; persistence failures are logged and never roll back the
/// displayed page.
pub struct ReadingFlow {
    reader: Reader,
    store: SyncStore,
    identity: Identity,
    book_id: String,
}

impl ReadingFlow {
    /// Flow for a user resolved up front (per-request server usage).
    pub fn for_user(store: SyncStore, user: Option<User>, book_id: impl Into<String>) -> Self {
        Self {
            reader: Reader::new(),
            store,
            identity: Identity::Fixed(user),
            book_id: book_id.into(),
        }
    }

    /// Flow following a live session context (single-user embedder usage).
    pub fn for_session(
        store: SyncStore,
        session: SessionContext,
        book_id: impl Into<String>,
    ) -> Self {
        Self {
            reader: Reader::new(),
            store,
            identity: Identity::Context(session),
            book_id: book_id.into(),
        }
    }

    fn current_user(&self) -> Option<User> {
        match &self.identity {
            Identity::Fixed(user) => user.clone(),
            Identity::Context(session) => session.current(),
        }
    }

    /// The underlying reader.
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    /// Open the source URL, resuming at the user's saved page.
    pub async fn open<L>(&mut self, loader: &L, url: &str) -> Result<()>
    where
        L: DocumentLoader + ?Sized,
    {
        let user = self.current_user();
        let saved = self.store.progress(user.as_ref(), &self.book_id)?;
        self.reader.open(loader, url, saved).await
    }

    /// Request a page; see [`Reader::go_to_page`].
    pub fn go_to_page(&mut self, page: u32) -> bool {
        self.reader.go_to_page(page)
    }

    /// Draw the latest requested page and persist it as the user's progress.
    pub fn render_pending(&mut self) -> Result<Option<RenderedPage>> {
        let rendered = self.reader.render_pending()?;

        if let Some(page) = &rendered {
            let user = self.current_user();
            if user.is_some()
                && let Some(url) = self.reader.source_url()
                && let Err(e) = self
                    .store
                    .set_progress(user.as_ref(), &self.book_id, page.number, url)
            {
                tracing::warn!(error = %e, book = %self.book_id, "failed to persist progress");
            }
        }

        Ok(rendered)
    }
}
