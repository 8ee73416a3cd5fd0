use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{DocumentContent, LineItem};

/// A single field change coming from the interactive editing session.
///
/// Serialized as `{"field": "...", "value": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldEdit {
    Title(String),
    ClientName(String),
    ClientEmail(String),
    ClientPhone(String),
    ClientAddress(String),
    ClientTaxId(String),
    Notes(String),
    TermsScope(String),
    PaymentTerms(String),
    StartDate(Option<NaiveDate>),
    EndDate(Option<NaiveDate>),
    /// Replace the whole item list, keeping the ids the editor supplies.
    Items(Vec<LineItem>),
    /// Upsert a single item by id; unknown ids are appended.
    Item(LineItem),
    RemoveItem(Uuid),
    /// Replace the whole content, as a full-document update does.
    Content(DocumentContent),
}

impl FieldEdit {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::ClientName(_) => "client_name",
            Self::ClientEmail(_) => "client_email",
            Self::ClientPhone(_) => "client_phone",
            Self::ClientAddress(_) => "client_address",
            Self::ClientTaxId(_) => "client_tax_id",
            Self::Notes(_) => "notes",
            Self::TermsScope(_) => "terms_scope",
            Self::PaymentTerms(_) => "payment_terms",
            Self::StartDate(_) => "start_date",
            Self::EndDate(_) => "end_date",
            Self::Items(_) => "items",
            Self::Item(_) => "item",
            Self::RemoveItem(_) => "remove_item",
            Self::Content(_) => "content",
        }
    }

    /// Apply the edit to `content`. User edits always win, including
    /// edits that clear a field.
    pub fn apply(self, content: &mut DocumentContent) {
        match self {
            Self::Title(v) => content.title = v,
            Self::ClientName(v) => content.client.name = v,
            Self::ClientEmail(v) => content.client.email = v,
            Self::ClientPhone(v) => content.client.phone = v,
            Self::ClientAddress(v) => content.client.address = v,
            Self::ClientTaxId(v) => content.client.tax_id = v,
            Self::Notes(v) => content.notes = v,
            Self::TermsScope(v) => content.terms.scope = v,
            Self::PaymentTerms(v) => content.terms.payment_terms = v,
            Self::StartDate(v) => content.terms.start_date = v,
            Self::EndDate(v) => content.terms.end_date = v,
            Self::Items(items) => content.items = items,
            Self::Item(item) => match content.items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => *existing = item,
                None => content.items.push(item),
            },
            Self::RemoveItem(id) => content.items.retain(|i| i.id != id),
            Self::Content(replacement) => *content = replacement,
        }
    }
}
