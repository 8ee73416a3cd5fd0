mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::gateway::AiContentSource;
use crate::session::{SessionConfig, SessionRegistry};

/// Shared state for every handler.
///
/// Reads go straight to the database. Every write to an existing document
/// goes through its session in `sessions`.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: SessionRegistry,
    pub ai: Option<Arc<dyn AiContentSource>>,
}

impl AppState {
    pub fn new(db: Database, config: SessionConfig) -> Self {
        let sessions = SessionRegistry::new(Arc::new(db.clone()), config);
        Self {
            db,
            sessions,
            ai: None,
        }
    }

    pub fn with_ai_source(mut self, source: Arc<dyn AiContentSource>) -> Self {
        self.ai = Some(source);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Documents
        .route("/documents", get(handlers::list_documents))
        .route("/documents", post(handlers::create_document))
        .route("/documents/{id}", get(handlers::get_document))
        .route("/documents/{id}", put(handlers::update_document))
        .route("/documents/{id}", delete(handlers::delete_document))
        // Editing sessions
        .route("/documents/{id}/edits", post(handlers::edit_document))
        .route("/documents/{id}/generate", post(handlers::generate_content))
        .route("/documents/{id}/flush", post(handlers::flush_document))
        .route("/documents/{id}/session", delete(handlers::close_session))
        // Payment status
        .route("/documents/{id}/mark-paid", post(handlers::mark_as_paid))
        .route("/documents/{id}/undo-payment", post(handlers::undo_payment))
        .route("/documents/{id}/void", post(handlers::void_receipt))
        .route("/documents/{id}/can-undo", get(handlers::can_undo))
        // Relationships
        .route("/documents/{id}/relationships", get(handlers::list_relationships))
        .route("/documents/{id}/workflow", get(handlers::get_workflow))
        .route("/relationships", post(handlers::create_relationship))
        .route("/relationships/validate", get(handlers::validate_relationship))
        .route("/relationships/{id}", delete(handlers::delete_relationship))
        .route("/document-types/{doc_type}/next", get(handlers::suggested_next))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
