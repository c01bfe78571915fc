use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::api::{filters, sessions};
use crate::pipeline::catalog::{FilterCatalog, HttpFilterCatalog, SharedFilterCatalogSource};
use crate::pipeline::descriptions::FilterDescriptions;
use crate::pipeline::processing::{HttpImageProcessing, SharedImageProcessingOps};
use crate::pipeline::session::WorkflowSession;
use crate::pipeline::settings::ServiceSettings;

/// External ports and injected tables every new session is built from.
#[derive(Clone)]
pub struct WorkflowServices {
    pub processor: SharedImageProcessingOps,
    pub catalog_source: SharedFilterCatalogSource,
    pub descriptions: Arc<FilterDescriptions>,
}

impl WorkflowServices {
    pub fn new(
        processor: SharedImageProcessingOps,
        catalog_source: SharedFilterCatalogSource,
        descriptions: FilterDescriptions,
    ) -> Self {
        Self {
            processor,
            catalog_source,
            descriptions: Arc::new(descriptions),
        }
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let base_url = settings.processing_base_url.clone();
        Self::new(
            Arc::new(HttpImageProcessing::new(
                base_url.clone(),
                settings.request_timeout,
            )),
            Arc::new(HttpFilterCatalog::new(base_url, settings.request_timeout)),
            settings.descriptions.clone(),
        )
    }

    fn new_session(&self, catalog: Option<FilterCatalog>) -> WorkflowSession {
        let session = WorkflowSession::new(
            self.processor.clone(),
            self.catalog_source.clone(),
            self.descriptions.clone(),
        );
        match catalog {
            Some(catalog) => session.with_catalog(catalog),
            None => session,
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Arc<WorkflowSession>>>,
}

impl SessionStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<WorkflowSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: WorkflowSession) -> (Uuid, Arc<WorkflowSession>) {
        let id = Uuid::new_v4();
        let session = Arc::new(session);
        self.lock().insert(id, session.clone());
        (id, session)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<WorkflowSession>> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub services: WorkflowServices,
    pub sessions: Arc<SessionStore>,
    catalog_cache: Arc<Mutex<Option<FilterCatalog>>>,
}

impl AppState {
    pub fn new(services: WorkflowServices) -> Self {
        Self {
            service_name: "cvlab-backend-core",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            services,
            sessions: Arc::new(SessionStore::default()),
            catalog_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Last catalog successfully fetched through the filters endpoint.
    pub fn cached_catalog(&self) -> Option<FilterCatalog> {
        self.catalog_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store_catalog(&self, catalog: FilterCatalog) {
        *self
            .catalog_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(catalog);
    }

    pub fn create_session(&self) -> (Uuid, Arc<WorkflowSession>) {
        let session = self.services.new_session(self.cached_catalog());
        self.sessions.insert(session)
    }
}

pub fn build_router(settings: &ServiceSettings) -> Router {
    build_router_with_services(WorkflowServices::from_settings(settings))
}

pub fn build_router_with_services(services: WorkflowServices) -> Router {
    build_router_with_state(AppState::new(services))
}

pub fn build_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/filters", get(filters::list_filters_handler))
        .route(
            "/api/filters/{filter_name}/defaults",
            get(filters::filter_defaults_handler),
        )
        .route("/api/sessions", post(sessions::create_session_handler))
        .route(
            "/api/sessions/{session_id}",
            get(sessions::get_session_handler).delete(sessions::delete_session_handler),
        )
        .route(
            "/api/sessions/{session_id}/image",
            put(sessions::put_image_handler),
        )
        .route(
            "/api/sessions/{session_id}/apply",
            post(sessions::apply_filter_handler),
        )
        .route(
            "/api/sessions/{session_id}/workflow",
            delete(sessions::reset_workflow_handler),
        )
        .route(
            "/api/sessions/{session_id}/code",
            get(sessions::get_code_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: ServiceSettings) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    let app = build_router(&settings);
    info!(
        bind = %settings.bind,
        processing_base_url = %settings.processing_base_url,
        "starting cvlab-backend-core HTTP surface"
    );
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "session_count": state.sessions.len(),
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
