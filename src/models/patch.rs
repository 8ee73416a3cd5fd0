use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::PaymentState;

/// A partial document update proposed by the AI content generator.
///
/// Every field is optional. Merging (see [`crate::session::merge`]) only
/// applies fields that are present and non-empty, so an absent or blank
/// field never erases what the user typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub client: ClientPatch,
    pub items: Option<Vec<PatchItem>>,
    pub notes: Option<String>,
    pub terms: TermsPatch,
    /// Payment-relevant change; routed through the status machine, never assigned directly.
    pub payment_status: Option<PaymentState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TermsPatch {
    pub scope: Option<String>,
    pub payment_terms: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A line item as proposed by the generator, before ids are assigned.
///
/// `unit_price` is `None` when the generator left it out; `total` carries a
/// stated line total, used to recover a missing or zero unit price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchItem {
    pub description: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub sub_items: Vec<String>,
}

/// A correction made while reading a generator payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIntegrityWarning {
    #[error("unrecognized field `{field}` ignored")]
    UnknownField { field: String },
    #[error("field `{field}` had malformed value {value}, replaced with {replacement}")]
    CoercedNumber {
        field: String,
        value: String,
        replacement: f64,
    },
    #[error("field `{field}` had malformed value {value}, ignored")]
    Ignored { field: String, value: String },
    #[error("payment status change to {requested} rejected: {reason}")]
    RejectedTransition { requested: String, reason: String },
}

impl DocumentPatch {
    /// Read a loosely-typed generator payload into a patch.
    ///
    /// Keys are accepted in snake_case or camelCase. Malformed values are
    /// coerced or dropped with a warning rather than failing the patch:
    /// a non-numeric quantity becomes 1, a non-numeric price becomes 0.
    pub fn from_value(value: &Value) -> (Self, Vec<DataIntegrityWarning>) {
        let mut warnings = Vec::new();
        let mut patch = Self::default();

        let Some(obj) = value.as_object() else {
            warnings.push(DataIntegrityWarning::Ignored {
                field: "data".to_string(),
                value: value.to_string(),
            });
            return (patch, warnings);
        };

        for (key, value) in obj {
            let key = snake_key(key);
            match key.as_str() {
                "title" => patch.title = read_string(&key, value, &mut warnings),
                "notes" => patch.notes = read_string(&key, value, &mut warnings),
                "client" => read_client(value, &mut patch.client, &mut warnings),
                "client_name" => patch.client.name = read_string(&key, value, &mut warnings),
                "client_email" => patch.client.email = read_string(&key, value, &mut warnings),
                "client_phone" => patch.client.phone = read_string(&key, value, &mut warnings),
                "client_address" => {
                    patch.client.address = read_string(&key, value, &mut warnings)
                }
                "client_tax_id" => patch.client.tax_id = read_string(&key, value, &mut warnings),
                "terms" => read_terms(value, &mut patch.terms, &mut warnings),
                "items" => patch.items = read_items(value, &mut warnings),
                "payment_status" | "status" => {
                    patch.payment_status = value
                        .as_str()
                        .and_then(PaymentState::from_str)
                        .or_else(|| {
                            warnings.push(DataIntegrityWarning::Ignored {
                                field: key.clone(),
                                value: value.to_string(),
                            });
                            None
                        })
                }
                _ => warnings.push(DataIntegrityWarning::UnknownField { field: key }),
            }
        }

        (patch, warnings)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn read_client(value: &Value, client: &mut ClientPatch, warnings: &mut Vec<DataIntegrityWarning>) {
    let Some(obj) = value.as_object() else {
        warnings.push(DataIntegrityWarning::Ignored {
            field: "client".to_string(),
            value: value.to_string(),
        });
        return;
    };
    for (key, value) in obj {
        let key = snake_key(key);
        let field = format!("client.{key}");
        match key.as_str() {
            "name" => client.name = read_string(&field, value, warnings),
            "email" => client.email = read_string(&field, value, warnings),
            "phone" => client.phone = read_string(&field, value, warnings),
            "address" => client.address = read_string(&field, value, warnings),
            "tax_id" => client.tax_id = read_string(&field, value, warnings),
            _ => warnings.push(DataIntegrityWarning::UnknownField { field }),
        }
    }
}

fn read_terms(value: &Value, terms: &mut TermsPatch, warnings: &mut Vec<DataIntegrityWarning>) {
    let Some(obj) = value.as_object() else {
        // A bare string is treated as the scope of work.
        terms.scope = read_string("terms", value, warnings);
        return;
    };
    for (key, value) in obj {
        let key = snake_key(key);
        let field = format!("terms.{key}");
        match key.as_str() {
            "scope" => terms.scope = read_string(&field, value, warnings),
            "payment_terms" => terms.payment_terms = read_string(&field, value, warnings),
            "start_date" => terms.start_date = read_date(&field, value, warnings),
            "end_date" => terms.end_date = read_date(&field, value, warnings),
            _ => warnings.push(DataIntegrityWarning::UnknownField { field }),
        }
    }
}

fn read_items(value: &Value, warnings: &mut Vec<DataIntegrityWarning>) -> Option<Vec<PatchItem>> {
    let Some(list) = value.as_array() else {
        warnings.push(DataIntegrityWarning::Ignored {
            field: "items".to_string(),
            value: value.to_string(),
        });
        return None;
    };

    let items = list
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| read_item(index, raw, warnings))
        .collect();
    Some(items)
}

fn read_item(
    index: usize,
    raw: &Value,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<PatchItem> {
    let Some(obj) = raw.as_object() else {
        warnings.push(DataIntegrityWarning::Ignored {
            field: format!("items[{index}]"),
            value: raw.to_string(),
        });
        return None;
    };

    let mut item = PatchItem {
        description: String::new(),
        quantity: 1.0,
        unit_price: None,
        total: None,
        sub_items: Vec::new(),
    };

    for (key, value) in obj {
        let key = snake_key(key);
        let field = format!("items[{index}].{key}");
        match key.as_str() {
            "description" | "name" => {
                item.description = read_string(&field, value, warnings).unwrap_or_default()
            }
            "quantity" | "qty" => item.quantity = coerce_number(&field, value, 1.0, warnings),
            "unit_price" | "price" => {
                item.unit_price = Some(coerce_number(&field, value, 0.0, warnings))
            }
            "total" | "total_amount" | "amount" => item.total = parse_number(value),
            "sub_items" => item.sub_items = read_sub_items(&field, value, warnings),
            "id" => {}
            _ => warnings.push(DataIntegrityWarning::UnknownField { field }),
        }
    }

    Some(item)
}

fn read_sub_items(
    field: &str,
    value: &Value,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Vec<String> {
    match value.as_array() {
        Some(list) => list
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        None => {
            warnings.push(DataIntegrityWarning::Ignored {
                field: field.to_string(),
                value: value.to_string(),
            });
            Vec::new()
        }
    }
}

fn read_string(
    field: &str,
    value: &Value,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Number(n) => Some(n.to_string()),
        other => {
            warnings.push(DataIntegrityWarning::Ignored {
                field: field.to_string(),
                value: other.to_string(),
            });
            None
        }
    }
}

fn read_date(
    field: &str,
    value: &Value,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> Option<NaiveDate> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                warnings.push(DataIntegrityWarning::Ignored {
                    field: field.to_string(),
                    value: value.to_string(),
                });
                None
            }
        },
        other => {
            warnings.push(DataIntegrityWarning::Ignored {
                field: field.to_string(),
                value: other.to_string(),
            });
            None
        }
    }
}

/// Parse a JSON number or numeric string, tolerating thousands separators.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn coerce_number(
    field: &str,
    value: &Value,
    fallback: f64,
    warnings: &mut Vec<DataIntegrityWarning>,
) -> f64 {
    parse_number(value).unwrap_or_else(|| {
        warnings.push(DataIntegrityWarning::CoercedNumber {
            field: field.to_string(),
            value: value.to_string(),
            replacement: fallback,
        });
        fallback
    })
}

/// `unitPrice` → `unit_price`; snake_case keys pass through unchanged.
fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
