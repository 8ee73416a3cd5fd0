use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentType;

/// A directed link from one document to a document derived from it.
///
/// Edges are created and removed only by explicit user action, and only
/// after [`RelationshipGraph::validate`](crate::workflow::RelationshipGraph::validate)
/// has accepted the (source, target) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipEdge {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship_type: RelationshipType,
    pub created_at: DateTime<Utc>,
}

/// Storage tag for an edge.
///
/// Every edge ending at a receipt shares the single `ToReceipt` tag, so the
/// tag alone does not tell a quotation-derived receipt from an invoice-derived
/// one; consumers needing that must look at the source document's type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    QuotationToContract,
    QuotationToInvoice,
    ContractToInvoice,
    ToReceipt,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotationToContract => "quotation_to_contract",
            Self::QuotationToInvoice => "quotation_to_invoice",
            Self::ContractToInvoice => "contract_to_invoice",
            Self::ToReceipt => "to_receipt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "quotation_to_contract" => Some(Self::QuotationToContract),
            "quotation_to_invoice" => Some(Self::QuotationToInvoice),
            "contract_to_invoice" => Some(Self::ContractToInvoice),
            "to_receipt" => Some(Self::ToReceipt),
            _ => None,
        }
    }
}

/// Input for linking two documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelationshipInput {
    pub source_id: Uuid,
    pub target_id: Uuid,
}

/// Result of a dry-run edge validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Suggested follow-up document types for a quick-action UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedNext {
    pub doc_type: DocumentType,
    pub next: Vec<DocumentType>,
}
