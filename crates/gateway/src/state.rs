//! Shared application state

use axum::extract::FromRef;
use cmr_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, DocumentStore},
    services::{DocumentService, PhotoService, ReserveService, SignatureService},
    storage::ObjectStore,
    AggregateBuilder, LifecycleEngine,
};
use cmr_export::{ExportOptions, ImageFetcher};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent when running on the in-memory store
    pub db: Option<DbPool>,
    pub jwt: Arc<JwtManager>,
    pub documents: DocumentService,
    pub engine: LifecycleEngine,
    pub reserves: ReserveService,
    pub photos: PhotoService,
    pub signatures: SignatureService,
    pub aggregates: AggregateBuilder,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub export: Arc<ExportOptions>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn ImageFetcher>,
        export: ExportOptions,
        jwt: Arc<JwtManager>,
    ) -> Self {
        Self {
            db: None,
            jwt,
            documents: DocumentService::new(store.clone()),
            engine: LifecycleEngine::new(store.clone()),
            reserves: ReserveService::new(store.clone(), objects.clone(), &config),
            photos: PhotoService::new(store.clone(), objects.clone(), &config),
            signatures: SignatureService::new(store.clone(), objects.clone(), &config),
            aggregates: AggregateBuilder::new(store, objects, &config),
            fetcher,
            export: Arc::new(export),
            config: Arc::new(config),
        }
    }

    pub fn with_database(mut self, db: DbPool) -> Self {
        self.db = Some(db);
        self
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}
