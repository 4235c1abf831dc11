//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::db::Database;
use crate::reader::{HttpDocumentLoader, ReadingFlow};
use crate::resolver::Resolver;
use crate::store::SyncStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Book metadata catalog client.
    pub catalog: CatalogClient,
    /// Free e-book source resolver.
    pub resolver: Arc<Resolver>,
    /// Favorites and progress store.
    pub store: SyncStore,
    /// Document loader for reader sessions.
    pub loader: HttpDocumentLoader,
    /// Open reader sessions, keyed by the (user, book) document key.
    readers: Arc<parking_lot::Mutex<HashMap<String, ReadingFlow>>>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config, db: Database, auth: AuthService) -> Self {
        let catalog = CatalogClient::new(&config.catalog.base_url);
        let resolver = Arc::new(Resolver::with_default_providers(&config.sources));
        let store = SyncStore::new(db.clone());

        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            catalog,
            resolver,
            store,
            loader: HttpDocumentLoader::new(),
            readers: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// Install an open reader session, replacing (and discarding) any stale
    /// session for the same key.
    pub fn insert_reader(&self, key: String, flow: ReadingFlow) {
        self.readers.lock().insert(key, flow);
    }

    /// Run a closure against an open reader session. Returns None when no
    /// session exists for the key.
    pub fn with_reader<R>(&self, key: &str, f: impl FnOnce(&mut ReadingFlow) -> R) -> Option<R> {
        self.readers.lock().get_mut(key).map(f)
    }

    /// Drop a reader session.
    pub fn remove_reader(&self, key: &str) {
        self.readers.lock().remove(key);
    }
}
