use crate::auth::{AuthService, SessionContext};
use crate::config::Config;
use crate::db::{Database, ProgressEntry, User, doc_key, now_timestamp};
use crate::error::{AppError, Result};
use crate::reader::{
    DocumentLoader, PageRenderer, Reader, ReaderState, ReadingFlow, RenderedPage,
};
use crate::resolver::{ResolvedSource, Resolver, SourceProvider};
use crate::store::SyncStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn make_user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        display_name: None,
        created_at: now_timestamp(),
        last_login: None,
    }
}

fn create_user(db: &Database, id: &str, email: &str) -> User {
    let user = make_user(id, email);
    db.create_user(&user).unwrap();
    user
}

// ============================================================================
// DATABASE
// ============================================================================

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");

    let found = db.get_user_by_email("alice@example.com").unwrap().unwrap();
    assert_eq!(found.id, "user-1");

    let found_by_id = db.get_user_by_id(&user.id).unwrap().unwrap();
    assert_eq!(found_by_id.email, "alice@example.com");
}

#[test]
fn db_duplicate_email_fails() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    let dup = make_user("user-2", "alice@example.com");
    assert!(db.create_user(&dup).is_err());
}

#[test]
fn db_progress_merge_preserves_created_at() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");

    let first = ProgressEntry {
        doc_key: doc_key(&user.id, "book-1"),
        user_id: user.id.clone(),
        book_id: "book-1".to_string(),
        page: 3,
        source_url: "https://example.com/a.pdf".to_string(),
        created_at: 100,
        updated_at: 100,
    };
    db.save_progress(&first).unwrap();

    let second = ProgressEntry {
        page: 9,
        created_at: 200,
        updated_at: 200,
        ..first.clone()
    };
    db.save_progress(&second).unwrap();

    let stored = db.get_progress(&user.id, "book-1").unwrap().unwrap();
    assert_eq!(stored.page, 9);
    assert_eq!(stored.created_at, 100); // first write wins
    assert_eq!(stored.updated_at, 200);
}

#[test]
fn db_single_progress_entry_per_pair() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db.clone());

    for page in [2, 5, 4] {
        store
            .set_progress(Some(&user), "book-1", page, "https://example.com/a.pdf")
            .unwrap();
    }

    assert_eq!(db.list_progress(&user.id).unwrap().len(), 1);
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(4));
}

#[test]
fn db_doc_key_format() {
    assert_eq!(doc_key("u1", "b1"), "u1_b1");
}

// ============================================================================
// FAVORITES & PROGRESS STORE
// ============================================================================

#[test]
fn store_defaults_for_unwritten_pairs() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db);

    assert!(!store.favorite(Some(&user), "book-1").unwrap());
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), None);
}

#[test]
fn store_favorite_round_trip() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db);

    store.set_favorite(Some(&user), "book-1", true).unwrap();
    assert!(store.favorite(Some(&user), "book-1").unwrap());

    store.set_favorite(Some(&user), "book-1", false).unwrap();
    assert!(!store.favorite(Some(&user), "book-1").unwrap());
}

#[test]
fn store_set_favorite_is_idempotent() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db.clone());

    store.set_favorite(Some(&user), "book-1", true).unwrap();
    store.set_favorite(Some(&user), "book-1", true).unwrap();

    assert!(store.favorite(Some(&user), "book-1").unwrap());
    assert_eq!(store.favorites_for(&user).unwrap().len(), 1);
}

#[test]
fn store_rejects_unauthenticated_writes_locally() {
    let db = test_db();
    let user = create_user(&db, "u1", "alice@example.com");
    let store = SyncStore::new(db.clone());

    let err = store
        .set_progress(None, "b1", 5, "https://example.com/a.pdf")
        .unwrap_err();
    assert!(matches!(err, AppError::AuthRequired));

    let err = store.set_favorite(None, "b1", true).unwrap_err();
    assert!(matches!(err, AppError::AuthRequired));

    // Store state unchanged
    assert!(db.get_progress(&user.id, "b1").unwrap().is_none());
    assert!(db.get_favorite(&user.id, "b1").unwrap().is_none());
}

#[test]
fn store_reads_default_without_session() {
    let store = SyncStore::new(test_db());

    assert!(!store.favorite(None, "b1").unwrap());
    assert_eq!(store.progress(None, "b1").unwrap(), None);
}

#[test]
fn store_lists_only_active_favorites() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db);

    store.set_favorite(Some(&user), "book-1", true).unwrap();
    store.set_favorite(Some(&user), "book-2", true).unwrap();
    store.set_favorite(Some(&user), "book-2", false).unwrap();

    let favorites = store.favorites_for(&user).unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].book_id, "book-1");
}

// ============================================================================
// AUTH
// ============================================================================

#[test]
fn auth_register_login_validate_logout() {
    let auth = AuthService::new(test_db(), 30, true);

    auth.register("alice@example.com", "secret").unwrap();
    let (user, token) = auth.login("Alice@Example.com", "secret").unwrap();
    assert_eq!(user.email, "alice@example.com");

    let validated = auth.validate_token(&token).unwrap().unwrap();
    assert_eq!(validated.id, user.id);

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_rejects_bad_credentials() {
    let auth = AuthService::new(test_db(), 30, true);
    auth.register("alice@example.com", "secret").unwrap();

    assert!(auth.login("alice@example.com", "wrong").is_err());
    assert!(auth.login("nobody@example.com", "secret").is_err());
}

#[test]
fn auth_registration_disabled() {
    let auth = AuthService::new(test_db(), 30, false);
    assert!(auth.register("alice@example.com", "secret").is_err());
}

// ============================================================================
// RESOLVER
// ============================================================================

struct StaticProvider {
    name: &'static str,
    result: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl StaticProvider {
    fn new(name: &'static str, result: Option<&'static str>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                result,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl SourceProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn try_resolve(&self, _title: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.map(|s| s.to_string()))
    }
}

struct FailingProvider;

#[async_trait]
impl SourceProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn try_resolve(&self, _title: &str) -> Result<Option<String>> {
        Err(AppError::Network("connection refused".to_string()))
    }
}

const FICTION_FALLBACKS: [&str; 3] = [
    "https://www.gutenberg.org/ebooks/1342/files/1342-pdf.pdf",
    "https://www.gutenberg.org/ebooks/84/files/84-pdf.pdf",
    "https://www.gutenberg.org/ebooks/5200/files/5200-pdf.pdf",
];

#[tokio::test]
async fn resolver_stops_at_first_hit() {
    let (first, first_calls) = StaticProvider::new("first", None);
    let (second, second_calls) = StaticProvider::new("second", Some("https://example.com/b.pdf"));
    let (third, third_calls) = StaticProvider::new("third", Some("https://example.com/c.pdf"));

    let resolver = Resolver::new(vec![Box::new(first), Box::new(second), Box::new(third)]);
    let source = resolver.resolve("Some Title", None).await;

    assert_eq!(
        source,
        ResolvedSource {
            url: Some("https://example.com/b.pdf".to_string()),
            is_authentic: true,
        }
    );
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resolver_treats_failure_as_no_result() {
    let (hit, hit_calls) = StaticProvider::new("hit", Some("https://example.com/x.pdf"));

    let resolver = Resolver::new(vec![Box::new(FailingProvider), Box::new(hit)]);
    let source = resolver.resolve("Some Title", None).await;

    assert_eq!(source.url.as_deref(), Some("https://example.com/x.pdf"));
    assert!(source.is_authentic);
    assert_eq!(hit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolver_falls_back_when_all_sources_dry() {
    // Every source errors or comes up empty for a well-known title.
    let (empty, _) = StaticProvider::new("empty", None);
    let resolver = Resolver::new(vec![
        Box::new(FailingProvider),
        Box::new(empty),
        Box::new(FailingProvider),
    ]);

    let source = resolver.resolve("Pride and Prejudice", Some("Fiction")).await;

    assert!(!source.is_authentic);
    let url = source.url.unwrap();
    assert!(FICTION_FALLBACKS.contains(&url.as_str()), "unexpected fallback: {}", url);
}

#[tokio::test]
async fn resolver_defaults_to_fiction_without_hint() {
    let resolver = Resolver::new(vec![]);
    let source = resolver.resolve("Anything", None).await;

    assert!(!source.is_authentic);
    assert!(FICTION_FALLBACKS.contains(&source.url.unwrap().as_str()));
}

#[tokio::test]
async fn resolver_degrades_unknown_genre_to_middle_grade() {
    let resolver = Resolver::new(vec![]);
    let source = resolver.resolve("Anything", Some("Biography")).await;

    let middle_grade = [
        "https://www.gutenberg.org/ebooks/5670/files/5670-pdf.pdf",
        "https://www.gutenberg.org/ebooks/514/files/514-pdf.pdf",
    ];
    assert!(middle_grade.contains(&source.url.unwrap().as_str()));
    assert!(!source.is_authentic);
}

#[tokio::test]
async fn resolver_never_touches_store() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");

    let resolver = Resolver::new(vec![Box::new(FailingProvider)]);
    let _ = resolver.resolve("Anything", None).await;

    assert!(db.list_progress(&user.id).unwrap().is_empty());
    assert!(db.list_favorites(&user.id).unwrap().is_empty());
}

// ============================================================================
// READER
// ============================================================================

/// Renderer that records which pages were drawn.
struct ScriptedRenderer {
    pages: u32,
    fail_on: Option<u32>,
    drawn: Arc<Mutex<Vec<u32>>>,
}

impl PageRenderer for ScriptedRenderer {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn render_page(&mut self, page: u32) -> Result<RenderedPage> {
        if self.fail_on == Some(page) {
            return Err(AppError::Render("bad page stream".to_string()));
        }
        self.drawn.lock().push(page);
        Ok(RenderedPage {
            number: page,
            text: format!("page {}", page),
        })
    }
}

/// Loader that hands out scripted renderers without touching the network.
struct FakeLoader {
    pages: u32,
    fail_load: bool,
    fail_on: Option<u32>,
    drawn: Arc<Mutex<Vec<u32>>>,
}

impl FakeLoader {
    fn new(pages: u32) -> Self {
        Self {
            pages,
            fail_load: false,
            fail_on: None,
            drawn: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl DocumentLoader for FakeLoader {
    async fn load(&self, _url: &str) -> Result<Box<dyn PageRenderer>> {
        if self.fail_load {
            return Err(AppError::Render("not a PDF".to_string()));
        }
        Ok(Box::new(ScriptedRenderer {
            pages: self.pages,
            fail_on: self.fail_on,
            drawn: self.drawn.clone(),
        }))
    }
}

#[tokio::test]
async fn reader_opens_at_saved_page() {
    let loader = FakeLoader::new(10);
    let mut reader = Reader::new();

    assert_eq!(*reader.state(), ReaderState::Idle);

    reader.open(&loader, "https://example.com/a.pdf", Some(7)).await.unwrap();
    assert_eq!(*reader.state(), ReaderState::Rendering);
    assert_eq!(reader.total_pages(), 10);

    let page = reader.render_pending().unwrap().unwrap();
    assert_eq!(page.number, 7);
    assert_eq!(*reader.state(), ReaderState::Ready);
}

#[tokio::test]
async fn reader_defaults_to_page_one() {
    let loader = FakeLoader::new(5);
    let mut reader = Reader::new();

    reader.open(&loader, "https://example.com/a.pdf", None).await.unwrap();
    assert_eq!(reader.current_page(), 1);
}

#[tokio::test]
async fn reader_clamps_saved_page_to_document() {
    let loader = FakeLoader::new(5);
    let mut reader = Reader::new();

    reader.open(&loader, "https://example.com/a.pdf", Some(40)).await.unwrap();
    assert_eq!(reader.current_page(), 5);
}

#[tokio::test]
async fn reader_go_to_page_out_of_bounds_is_noop() {
    let loader = FakeLoader::new(5);
    let mut reader = Reader::new();

    reader.open(&loader, "https://example.com/a.pdf", Some(3)).await.unwrap();
    reader.render_pending().unwrap();

    assert!(!reader.go_to_page(0));
    assert!(!reader.go_to_page(6));
    assert_eq!(reader.current_page(), 3);
    assert_eq!(*reader.state(), ReaderState::Ready);

    assert!(reader.go_to_page(5));
    assert_eq!(reader.current_page(), 5);
}

#[tokio::test]
async fn reader_load_failure_is_terminal() {
    let mut loader = FakeLoader::new(5);
    loader.fail_load = true;

    let mut reader = Reader::new();
    let err = reader
        .open(&loader, "https://example.com/a.pdf", None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Render(_)));
    assert!(matches!(reader.state(), ReaderState::Error(_)));
    assert!(!reader.go_to_page(1));
}

#[tokio::test]
async fn reader_render_failure_is_terminal() {
    let mut loader = FakeLoader::new(5);
    loader.fail_on = Some(2);

    let mut reader = Reader::new();
    reader.open(&loader, "https://example.com/a.pdf", None).await.unwrap();
    reader.render_pending().unwrap();

    assert!(reader.go_to_page(2));
    assert!(reader.render_pending().is_err());
    assert!(matches!(reader.state(), ReaderState::Error(_)));
    assert!(!reader.go_to_page(3));
}

#[tokio::test]
async fn reading_flow_persists_rendered_pages() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db);
    let loader = FakeLoader::new(10);

    let mut flow = ReadingFlow::for_user(store.clone(), Some(user.clone()), "book-1");
    flow.open(&loader, "https://example.com/a.pdf").await.unwrap();
    flow.render_pending().unwrap();

    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(1));

    flow.go_to_page(4);
    flow.render_pending().unwrap();
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(4));
}

#[tokio::test]
async fn reading_flow_resumes_at_saved_page() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db);
    let loader = FakeLoader::new(10);

    store
        .set_progress(Some(&user), "book-1", 6, "https://example.com/a.pdf")
        .unwrap();

    let mut flow = ReadingFlow::for_user(store, Some(user), "book-1");
    flow.open(&loader, "https://example.com/a.pdf").await.unwrap();

    assert_eq!(flow.reader().current_page(), 6);
}

#[tokio::test]
async fn reading_flow_latest_navigation_wins() {
    // go_to_page(3) then go_to_page(7) before the first draw completes;
    // only page 7 is drawn and only page 7 is persisted.
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db.clone());
    let loader = FakeLoader::new(10);
    let drawn = loader.drawn.clone();

    let mut flow = ReadingFlow::for_user(store.clone(), Some(user.clone()), "book-1");
    flow.open(&loader, "https://example.com/a.pdf").await.unwrap();
    flow.render_pending().unwrap();
    drawn.lock().clear();

    assert!(flow.go_to_page(3));
    assert!(flow.go_to_page(7));

    let page = flow.render_pending().unwrap().unwrap();
    assert_eq!(page.number, 7);
    assert_eq!(flow.render_pending().unwrap(), None);

    assert_eq!(*drawn.lock(), vec![7]);
    assert_eq!(flow.reader().current_page(), 7);
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(7));
}

#[tokio::test]
async fn reading_flow_skips_persistence_without_session() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db.clone());
    let loader = FakeLoader::new(10);

    let mut flow = ReadingFlow::for_user(store, None, "book-1");
    flow.open(&loader, "https://example.com/a.pdf").await.unwrap();
    flow.render_pending().unwrap();

    flow.go_to_page(2);
    let page = flow.render_pending().unwrap().unwrap();
    assert_eq!(page.number, 2);

    assert!(db.get_progress(&user.id, "book-1").unwrap().is_none());
}

#[tokio::test]
async fn reading_flow_follows_session_context() {
    let db = test_db();
    let user = create_user(&db, "user-1", "alice@example.com");
    let store = SyncStore::new(db.clone());
    let session = SessionContext::new();
    let loader = FakeLoader::new(10);

    let mut flow = ReadingFlow::for_session(store.clone(), session.clone(), "book-1");
    flow.open(&loader, "https://example.com/a.pdf").await.unwrap();
    flow.render_pending().unwrap();

    // Not signed in yet: nothing persisted
    assert!(db.get_progress(&user.id, "book-1").unwrap().is_none());

    session.set(user.clone());
    flow.go_to_page(3);
    flow.render_pending().unwrap();
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(3));

    session.clear();
    flow.go_to_page(4);
    flow.render_pending().unwrap();
    // Logout stops persistence; the last saved page stays at 3
    assert_eq!(store.progress(Some(&user), "book-1").unwrap(), Some(3));
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn config_default_template_parses() {
    let config: Config = toml::from_str(&Config::generate_default()).unwrap();

    assert_eq!(config.catalog.max_results, 12);
    assert_eq!(config.sources.gutendex_url, "https://gutendex.com");
    assert!(config.auth.registration_enabled());
}

#[test]
fn config_empty_file_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();

    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.catalog.base_url, "https://www.googleapis.com/books/v1");
}
