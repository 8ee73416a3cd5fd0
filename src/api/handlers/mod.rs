use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::db::Database;
use crate::error::{PersistenceError, SessionError};
use crate::models::*;
use crate::session::{DocumentSession, GenerationOutcome};
use crate::workflow::{can_undo as undo_open, RelationshipGraph, StatusTransition};

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side; clients only see a generic message.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// A rejected business rule. Safe to show to the client as-is.
fn rejected(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();
    tracing::warn!("Rejected: {}", msg);
    (StatusCode::UNPROCESSABLE_ENTITY, msg)
}

fn session_error(e: SessionError) -> (StatusCode, String) {
    match e {
        SessionError::Transition(e) => rejected(e),
        SessionError::Persistence(PersistenceError::NotFound(_)) => document_not_found(),
        SessionError::Ai(e) => {
            tracing::warn!("AI generation failed: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string())
        }
        e @ (SessionError::Persistence(_) | SessionError::Closed) => internal_error(e),
    }
}

fn document_not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Document not found".to_string())
}

fn find_document(db: &Database, id: Uuid) -> Result<Document, (StatusCode, String)> {
    db.get_document(id)
        .map_err(internal_error)?
        .ok_or_else(document_not_found)
}

async fn open_session(state: &AppState, id: Uuid) -> Result<DocumentSession, (StatusCode, String)> {
    state.sessions.open(id).await.map_err(session_error)
}

/// Save whatever the session holds and return the stored document.
async fn flush_session(
    state: &AppState,
    id: Uuid,
    session: &DocumentSession,
) -> Result<Json<Document>, (StatusCode, String)> {
    session.flush().await.map_err(session_error)?;
    find_document(&state.db, id).map(Json)
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Documents
// ============================================================

/// Query parameters for listing documents.
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    /// Only return documents of this type.
    #[serde(rename = "type")]
    pub doc_type: Option<DocumentType>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<Document>>, (StatusCode, String)> {
    state
        .db
        .get_documents(query.doc_type)
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    find_document(&state.db, id).map(Json)
}

pub async fn create_document(
    State(state): State<AppState>,
    Json(input): Json<CreateDocumentInput>,
) -> Result<(StatusCode, Json<Document>), (StatusCode, String)> {
    state
        .db
        .create_document(input)
        .map(|d| (StatusCode::CREATED, Json(d)))
        .map_err(internal_error)
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateDocumentInput>,
) -> Result<Json<Document>, (StatusCode, String)> {
    let session = open_session(&state, id).await?;
    session
        .apply_user_edit(FieldEdit::Content(input.content))
        .await
        .map_err(session_error)?;
    flush_session(&state, id, &session).await
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if let Err(e) = state.sessions.close(id).await {
        tracing::warn!("Closing session for deleted document {} failed: {}", id, e);
    }
    if state.db.delete_document(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(document_not_found())
    }
}

// ============================================================
// Payment Status
// ============================================================

/// Run a transition in the document's session so later saves carry the new status.
async fn apply_transition(
    state: &AppState,
    id: Uuid,
    transition: StatusTransition,
) -> Result<Json<Document>, (StatusCode, String)> {
    let session = open_session(state, id).await?;
    let status = session.transition(transition).await.map_err(session_error)?;
    tracing::debug!("Document {} {:?} -> {}", id, transition, status.state);
    flush_session(state, id, &session).await
}

pub async fn mark_as_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    apply_transition(&state, id, StatusTransition::MarkAsPaid).await
}

/// Undo a payment. Outside the undo window the document is returned unchanged.
pub async fn undo_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    apply_transition(&state, id, StatusTransition::UndoPayment).await
}

pub async fn void_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    apply_transition(&state, id, StatusTransition::VoidReceipt).await
}

pub async fn can_undo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UndoAvailability>, (StatusCode, String)> {
    let status = match state.sessions.get(id).await {
        Some(session) => session.snapshot().await.map_err(session_error)?.draft.status,
        None => find_document(&state.db, id)?.status,
    };
    Ok(Json(UndoAvailability {
        can_undo: undo_open(&status, Utc::now()),
        undo_deadline: status.undo_deadline,
    }))
}

// ============================================================
// Editing Sessions
// ============================================================

/// The in-memory state of an open document.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub draft: DocumentDraft,
    pub revision: u64,
    /// Whether the draft has changes the store has not seen yet.
    pub dirty: bool,
}

/// Apply one field edit. The save is debounced.
pub async fn edit_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(edit): Json<FieldEdit>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = open_session(&state, id).await?;
    session.apply_user_edit(edit).await.map_err(session_error)?;

    let snapshot = session.snapshot().await.map_err(session_error)?;
    Ok(Json(SessionView {
        draft: snapshot.draft,
        revision: snapshot.revision,
        dirty: snapshot.dirty,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GenerateInput {
    pub prompt: String,
    #[serde(default)]
    pub external_context: Option<String>,
}

pub async fn generate_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<GenerateInput>,
) -> Result<Json<GenerationOutcome>, (StatusCode, String)> {
    let Some(source) = state.ai.clone() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "AI generator is not configured".to_string(),
        ));
    };

    let session = open_session(&state, id).await?;
    session
        .generate(source.as_ref(), input.prompt, input.external_context)
        .await
        .map(Json)
        .map_err(session_error)
}

/// Save pending edits now instead of waiting for the quiet period.
pub async fn flush_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, (StatusCode, String)> {
    let session = open_session(&state, id).await?;
    flush_session(&state, id, &session).await
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.close(id).await.map_err(session_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "No open session".to_string()))
    }
}

// ============================================================
// Relationships
// ============================================================

pub async fn list_relationships(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RelationshipEdge>>, (StatusCode, String)> {
    find_document(&state.db, id)?;
    state
        .db
        .get_relationships(id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_relationship(
    State(state): State<AppState>,
    Json(input): Json<CreateRelationshipInput>,
) -> Result<(StatusCode, Json<RelationshipEdge>), (StatusCode, String)> {
    let source = find_document(&state.db, input.source_id)?;
    let target = find_document(&state.db, input.target_id)?;

    let graph = RelationshipGraph::load(&state.db, &[source.id, target.id])
        .await
        .map_err(internal_error)?;
    let relationship_type = graph.check_link(&source, &target).map_err(rejected)?;

    let edge = state
        .db
        .create_relationship(source.id, target.id, relationship_type)
        .map_err(internal_error)?;
    tracing::info!(
        "Linked {} {} -> {} {} ({})",
        source.doc_type,
        source.id,
        target.doc_type,
        target.id,
        relationship_type.as_str()
    );
    Ok((StatusCode::CREATED, Json(edge)))
}

pub async fn delete_relationship(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.db.delete_relationship(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Relationship not found".to_string()))
    }
}

/// Query parameters for a dry-run edge check.
#[derive(Debug, Deserialize)]
pub struct ValidateRelationshipQuery {
    pub source: Uuid,
    pub target: Uuid,
}

pub async fn validate_relationship(
    State(state): State<AppState>,
    Query(query): Query<ValidateRelationshipQuery>,
) -> Result<Json<EdgeValidation>, (StatusCode, String)> {
    let source = find_document(&state.db, query.source)?;
    let target = find_document(&state.db, query.target)?;

    let graph = RelationshipGraph::load(&state.db, &[source.id, target.id])
        .await
        .map_err(internal_error)?;
    let validation = match graph.check_link(&source, &target) {
        Ok(_) => EdgeValidation {
            valid: true,
            reason: None,
        },
        Err(e) => EdgeValidation {
            valid: false,
            reason: Some(e.to_string()),
        },
    };
    Ok(Json(validation))
}

/// The linear workflow containing a document, earliest stage first.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Document>>, (StatusCode, String)> {
    let root = find_document(&state.db, id)?;
    let graph = RelationshipGraph::load(&state.db, &[root.id])
        .await
        .map_err(internal_error)?;

    let mut documents = vec![root];
    for doc_id in graph.document_ids() {
        if documents.iter().any(|d| d.id == doc_id) {
            continue;
        }
        if let Some(document) = state.db.get_document(doc_id).map_err(internal_error)? {
            documents.push(document);
        }
    }
    documents.sort_by(|a, b| {
        a.doc_type
            .cmp(&b.doc_type)
            .then(a.created_at.cmp(&b.created_at))
    });

    let path = graph
        .workflow_path(&documents)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(path))
}

pub async fn suggested_next(Path(doc_type): Path<DocumentType>) -> Json<SuggestedNext> {
    Json(SuggestedNext {
        doc_type,
        next: RelationshipGraph::suggested_next(doc_type),
    })
}
