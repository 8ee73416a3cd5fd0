mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::gateway::{PersistenceGateway, RelationshipStore};
use crate::models::*;

const DOCUMENT_COLUMNS: &str =
    "id, doc_type, status, paid_at, undo_deadline, content, created_at, updated_at";

const RELATIONSHIP_COLUMNS: &str = "id, source_id, target_id, relationship_type, created_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "docflow")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("docflow.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Document operations
    // ============================================================

    /// All documents, newest first, optionally restricted to one type.
    pub fn get_documents(&self, doc_type: Option<DocumentType>) -> Result<Vec<Document>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let documents = match doc_type {
            Some(doc_type) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_type = ?
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([doc_type.as_str()], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(documents)
    }

    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let document = conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"),
                [id.to_string()],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    pub fn create_document(&self, input: CreateDocumentInput) -> Result<Document> {
        self.insert_document(input.doc_type, PaymentStatus::unpaid(), input.content)
    }

    /// Insert a new document with its status in one statement.
    fn insert_document(
        &self,
        doc_type: DocumentType,
        status: PaymentStatus,
        content: DocumentContent,
    ) -> Result<Document> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            doc_type,
            status,
            content,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO documents (id, doc_type, status, paid_at, undo_deadline, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                document.id.to_string(),
                document.doc_type.as_str(),
                document.status.state.as_str(),
                document.status.paid_at.map(|t| t.to_rfc3339()),
                document.status.undo_deadline.map(|t| t.to_rfc3339()),
                serde_json::to_string(&document.content)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(document)
    }

    /// Insert a draft without an id, or overwrite the stored document with
    /// the draft's id. Returns `None` when the id is unknown.
    pub fn save_document(&self, draft: DocumentDraft) -> Result<Option<Document>> {
        let Some(id) = draft.id else {
            return self
                .insert_document(draft.doc_type, draft.status, draft.content)
                .map(Some);
        };

        let Some(existing) = self.get_document(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE documents SET status = ?, paid_at = ?, undo_deadline = ?, content = ?, updated_at = ?
             WHERE id = ?",
            (
                draft.status.state.as_str(),
                draft.status.paid_at.map(|t| t.to_rfc3339()),
                draft.status.undo_deadline.map(|t| t.to_rfc3339()),
                serde_json::to_string(&draft.content)?,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(Document {
            id,
            doc_type: existing.doc_type,
            status: draft.status,
            content: draft.content,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    pub fn update_document(&self, id: Uuid, input: UpdateDocumentInput) -> Result<Option<Document>> {
        let Some(existing) = self.get_document(id)? else {
            return Ok(None);
        };
        self.save_document(DocumentDraft {
            id: Some(id),
            doc_type: existing.doc_type,
            status: existing.status,
            content: input.content,
        })
    }

    pub fn update_document_status(&self, id: Uuid, status: PaymentStatus) -> Result<Option<Document>> {
        let Some(existing) = self.get_document(id)? else {
            return Ok(None);
        };
        self.save_document(DocumentDraft {
            status,
            ..DocumentDraft::from(existing)
        })
    }

    /// Delete a document and every relationship touching it.
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
            [id.to_string()],
        )?;
        let rows = tx.execute("DELETE FROM documents WHERE id = ?", [id.to_string()])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // ============================================================
    // Relationship operations
    // ============================================================

    pub fn create_relationship(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relationship_type: RelationshipType,
    ) -> Result<RelationshipEdge> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let edge = RelationshipEdge {
            id: Uuid::new_v4(),
            source_id,
            target_id,
            relationship_type,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO relationships (id, source_id, target_id, relationship_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                edge.id.to_string(),
                source_id.to_string(),
                target_id.to_string(),
                relationship_type.as_str(),
                edge.created_at.to_rfc3339(),
            ),
        )?;

        Ok(edge)
    }

    /// All edges where `doc_id` is the source or the target, oldest first.
    pub fn get_relationships(&self, doc_id: Uuid) -> Result<Vec<RelationshipEdge>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY created_at, rowid"
        ))?;
        let edges = stmt
            .query_map([doc_id.to_string()], row_to_relationship)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    pub fn get_relationship(&self, id: Uuid) -> Result<Option<RelationshipEdge>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let edge = conn
            .query_row(
                &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?"),
                [id.to_string()],
                row_to_relationship,
            )
            .optional()?;
        Ok(edge)
    }

    pub fn delete_relationship(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM relationships WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

#[async_trait]
impl PersistenceGateway for Database {
    async fn save(&self, draft: DocumentDraft) -> Result<Document, PersistenceError> {
        let id = draft.id;
        self.save_document(draft)?
            .ok_or_else(|| PersistenceError::NotFound(id.unwrap_or_default()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, PersistenceError> {
        Ok(self.get_document(id)?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        Ok(self.delete_document(id)?)
    }
}

#[async_trait]
impl RelationshipStore for Database {
    async fn create(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relationship_type: RelationshipType,
    ) -> Result<RelationshipEdge, PersistenceError> {
        Ok(self.create_relationship(source_id, target_id, relationship_type)?)
    }

    async fn list(&self, doc_id: Uuid) -> Result<Vec<RelationshipEdge>, PersistenceError> {
        Ok(self.get_relationships(doc_id)?)
    }

    async fn remove(&self, edge_id: Uuid) -> Result<bool, PersistenceError> {
        Ok(self.delete_relationship(edge_id)?)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let doc_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    let content: String = row.get(5)?;

    Ok(Document {
        id: parse_uuid(row.get::<_, String>(0)?),
        doc_type: DocumentType::from_str(&doc_type).ok_or_else(|| invalid_column(1, &doc_type))?,
        status: PaymentStatus {
            state: PaymentState::from_str(&status).ok_or_else(|| invalid_column(2, &status))?,
            paid_at: row.get::<_, Option<String>>(3)?.map(parse_datetime),
            undo_deadline: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        },
        content: serde_json::from_str(&content).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<RelationshipEdge> {
    let relationship_type: String = row.get(3)?;
    Ok(RelationshipEdge {
        id: parse_uuid(row.get::<_, String>(0)?),
        source_id: parse_uuid(row.get::<_, String>(1)?),
        target_id: parse_uuid(row.get::<_, String>(2)?),
        relationship_type: RelationshipType::from_str(&relationship_type)
            .ok_or_else(|| invalid_column(3, &relationship_type))?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn invalid_column(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unexpected value {value:?}").into(),
    )
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
