//! AI content generator boundary.
//!
//! The generator is external. This module defines its request/response
//! shapes, an HTTP client for it, and the normalisation applied to
//! whatever it returns before the patch reaches a session.

mod client;

pub use client::HttpContentSource;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DataIntegrityWarning, DocumentContent, DocumentPatch, DocumentType};
use crate::session::merge::resolve_unit_prices;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub document_type: DocumentType,
    /// The document as it currently stands in the editor.
    pub current_context: DocumentContent,
    /// Free-form context from outside the document, e.g. a linked quotation.
    pub external_context: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiAction {
    #[default]
    None,
    UpdateDocument,
    Navigate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub message: String,
    #[serde(default)]
    pub action: AiAction,
    /// Partial document in the same schema as [`DocumentPatch`], loosely typed.
    #[serde(default)]
    pub data: Option<Value>,
}

/// A generator patch after normalisation, with every correction made on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPatch {
    pub patch: DocumentPatch,
    pub warnings: Vec<DataIntegrityWarning>,
}

impl GenerationResponse {
    /// The document patch carried by this response, if it asks for an update.
    ///
    /// `context` is the content the generator was shown; it is used to
    /// recover unit prices the generator left out or zeroed.
    pub fn to_patch(&self, context: &DocumentContent) -> Option<NormalizedPatch> {
        if self.action != AiAction::UpdateDocument {
            return None;
        }
        let data = self.data.as_ref()?;
        Some(normalize_patch(data, context))
    }
}

/// Read a raw generator payload into a patch and fix up its prices.
pub fn normalize_patch(data: &Value, context: &DocumentContent) -> NormalizedPatch {
    let (mut patch, warnings) = DocumentPatch::from_value(data);
    if let Some(items) = patch.items.as_mut() {
        resolve_unit_prices(items, context);
    }
    for warning in &warnings {
        tracing::warn!("AI patch: {}", warning);
    }
    NormalizedPatch { patch, warnings }
}
