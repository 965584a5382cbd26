use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::kb::store::KbStore;
use crate::resolution::extractor::PhraseExtractor;
use crate::resolution::session::Session;

/// Open hiring-plan sessions, keyed by id. In memory only.
pub type SessionMap = Arc<RwLock<HashMap<Uuid, Session>>>;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Re-reads the KB files on every call; there is no KB cache to invalidate.
    pub store: KbStore,
    /// Heuristic-only unless LLM extraction is configured.
    pub extractor: PhraseExtractor,
    pub sessions: SessionMap,
}

impl AppState {
    pub fn new(config: Config, extractor: PhraseExtractor) -> Self {
        Self {
            store: KbStore::new(config.data_dir.clone()),
            config,
            extractor,
            sessions: SessionMap::default(),
        }
    }
}
