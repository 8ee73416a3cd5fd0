//! Boundaries to external collaborators.
//!
//! The engine never talks to storage or the AI generator directly; it goes
//! through these traits so sessions can be driven by the SQLite store in
//! production and by in-memory fakes in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::ai::{GenerationRequest, GenerationResponse};
use crate::error::{AiError, PersistenceError};
use crate::models::{Document, DocumentDraft, RelationshipEdge, RelationshipType};

/// Durable document store keyed by document id.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Upsert. A draft without an id is inserted and the store assigns one;
    /// the returned document's id is authoritative from then on.
    async fn save(&self, draft: DocumentDraft) -> Result<Document, PersistenceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>, PersistenceError>;

    /// Returns `false` if no document had that id.
    async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError>;
}

/// Durable store for relationship edges.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn create(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relationship_type: RelationshipType,
    ) -> Result<RelationshipEdge, PersistenceError>;

    /// All edges where `doc_id` is either the source or the target.
    async fn list(&self, doc_id: Uuid) -> Result<Vec<RelationshipEdge>, PersistenceError>;

    async fn remove(&self, edge_id: Uuid) -> Result<bool, PersistenceError>;
}

/// Produces partial document patches from natural-language prompts.
#[async_trait]
pub trait AiContentSource: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, AiError>;
}
