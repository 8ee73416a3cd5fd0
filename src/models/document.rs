use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::PaymentStatus;

/// A business document and its content.
///
/// Quotations, contracts, invoices and receipts all share the same
/// [`DocumentContent`] schema; the [`DocumentType`] decides which status
/// transitions and relationship edges are permitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub doc_type: DocumentType,
    pub status: PaymentStatus,
    pub content: DocumentContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The kind of business document.
///
/// Ordered by business progression: a quotation may lead to a contract,
/// a contract to an invoice, an invoice to a receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quotation,
    Contract,
    Invoice,
    Receipt,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        Self::Quotation,
        Self::Contract,
        Self::Invoice,
        Self::Receipt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quotation => "quotation",
            Self::Contract => "contract",
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "quotation" => Some(Self::Quotation),
            "contract" => Some(Self::Contract),
            "invoice" => Some(Self::Invoice),
            "receipt" => Some(Self::Receipt),
            _ => None,
        }
    }

    /// Whether documents of this type can be marked as paid.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Invoice | Self::Receipt)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content shared by every document type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentContent {
    /// Human-facing title or number, e.g. "INV-2024-001".
    pub title: String,
    pub client: ClientInfo,
    /// Ordered line items.
    pub items: Vec<LineItem>,
    pub notes: String,
    /// Only meaningful on contracts, carried by every type for a uniform schema.
    pub terms: ContractTerms,
}

impl DocumentContent {
    /// Sum of `quantity * unit_price` over all line items.
    pub fn total(&self) -> f64 {
        self.items.iter().map(LineItem::total).sum()
    }
}

/// Client identity fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub tax_id: String,
}

/// A single billable line.
///
/// `id` is a client-side key used to keep list rendering stable; it is
/// regenerated whenever an AI patch replaces the item list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_items: Vec<String>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            quantity,
            unit_price,
            sub_items: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Contract-specific terms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContractTerms {
    pub scope: String,
    pub payment_terms: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A document as submitted for saving.
///
/// `id` is `None` until the store has assigned one on first insert; from then
/// on every save must carry the assigned id so the store updates in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentDraft {
    pub id: Option<Uuid>,
    pub doc_type: DocumentType,
    pub status: PaymentStatus,
    #[serde(default)]
    pub content: DocumentContent,
}

impl DocumentDraft {
    /// An empty, never-saved document of the given type.
    pub fn new(doc_type: DocumentType) -> Self {
        Self {
            id: None,
            doc_type,
            status: PaymentStatus::default(),
            content: DocumentContent::default(),
        }
    }
}

impl From<Document> for DocumentDraft {
    fn from(doc: Document) -> Self {
        Self {
            id: Some(doc.id),
            doc_type: doc.doc_type,
            status: doc.status,
            content: doc.content,
        }
    }
}

/// Input for creating a document through the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentInput {
    pub doc_type: DocumentType,
    #[serde(default)]
    pub content: DocumentContent,
}

/// Input for replacing a document's content through the API.
///
/// Payment status only changes through the transition endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDocumentInput {
    pub content: DocumentContent,
}
