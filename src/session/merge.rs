//! Field-level merge of AI patches into a document snapshot.
//!
//! Rules:
//! - a scalar field is overwritten only when the patch carries a non-blank value;
//!   absent or blank fields leave the snapshot untouched
//! - a non-empty item list replaces the existing list wholesale, and every
//!   replacement item gets a fresh id; an empty list is ignored
//! - payment status is not merged here, it goes through the status machine

use uuid::Uuid;

use crate::models::{DocumentContent, DocumentPatch, LineItem, PatchItem};

/// Merge `patch` into `content`, returning the names of the fields that changed.
pub fn merge_patch(content: &mut DocumentContent, patch: DocumentPatch) -> Vec<&'static str> {
    let mut changed = Vec::new();

    let mut set = |name: &'static str, slot: &mut String, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            if *slot != value {
                *slot = value;
                changed.push(name);
            }
        }
    };

    set("title", &mut content.title, patch.title);
    set("client_name", &mut content.client.name, patch.client.name);
    set("client_email", &mut content.client.email, patch.client.email);
    set("client_phone", &mut content.client.phone, patch.client.phone);
    set("client_address", &mut content.client.address, patch.client.address);
    set("client_tax_id", &mut content.client.tax_id, patch.client.tax_id);
    set("notes", &mut content.notes, patch.notes);
    set("terms_scope", &mut content.terms.scope, patch.terms.scope);
    set(
        "payment_terms",
        &mut content.terms.payment_terms,
        patch.terms.payment_terms,
    );

    if let Some(date) = patch.terms.start_date {
        if content.terms.start_date != Some(date) {
            content.terms.start_date = Some(date);
            changed.push("start_date");
        }
    }
    if let Some(date) = patch.terms.end_date {
        if content.terms.end_date != Some(date) {
            content.terms.end_date = Some(date);
            changed.push("end_date");
        }
    }

    if let Some(items) = patch.items.filter(|items| !items.is_empty()) {
        content.items = items.into_iter().map(into_line_item).collect();
        changed.push("items");
    }

    changed
}

/// Fill in unit prices the generator left out or returned as zero.
///
/// Tries the item's own stated total first, then the total of the
/// same-description item in `context`, dividing by the new quantity.
pub fn resolve_unit_prices(items: &mut [PatchItem], context: &DocumentContent) {
    for item in items.iter_mut() {
        if item.unit_price.is_some_and(|p| p != 0.0) || item.quantity <= 0.0 {
            continue;
        }

        let stated_total = item.total.filter(|t| *t > 0.0);
        let prior_total = || {
            let key = item.description.trim().to_lowercase();
            context
                .items
                .iter()
                .find(|prior| prior.description.trim().to_lowercase() == key)
                .map(LineItem::total)
                .filter(|t| *t > 0.0)
        };

        if let Some(total) = stated_total.or_else(prior_total) {
            item.unit_price = Some(total / item.quantity);
        }
    }
}

fn into_line_item(item: PatchItem) -> LineItem {
    LineItem {
        id: Uuid::new_v4(),
        description: item.description,
        quantity: item.quantity,
        unit_price: item.unit_price.unwrap_or(0.0),
        sub_items: item.sub_items,
    }
}
