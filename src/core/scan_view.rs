use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::SectionId;

/// Typed view over a loosely structured scan result. Every field is optional;
/// absent, null and wrongly typed values all map to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultView {
    pub customer_name: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub budget: Option<String>,
    pub submission_deadline: Option<String>,
    pub deliverables: Option<Vec<String>>,
    pub offer_structure: Option<Vec<String>>,
    pub legal_requirements: Option<Vec<String>>,
    pub document_count: Option<u32>,
}

impl ScanResultView {
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };
        let list = |key: &str| {
            object.get(key).and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(value) => Some(value.trim().to_string()),
                        Value::Object(map) => map
                            .get("name")
                            .or_else(|| map.get("title"))
                            .and_then(Value::as_str)
                            .map(|value| value.trim().to_string()),
                        _ => None,
                    })
                    .filter(|value| !value.is_empty())
                    .collect::<Vec<_>>()
            })
        };

        Self {
            customer_name: text("customerName").or_else(|| text("customer")),
            tech_stack: list("techStack"),
            budget: text("budget").or_else(|| {
                object
                    .get("budget")
                    .and_then(Value::as_f64)
                    .map(|value| format!("{value:.0}"))
            }),
            submission_deadline: text("submissionDeadline").or_else(|| text("deadline")),
            deliverables: list("deliverables").or_else(|| list("requiredDeliverables")),
            offer_structure: list("offerStructure"),
            legal_requirements: list("legalRequirements"),
            document_count: object
                .get("documentCount")
                .and_then(Value::as_u64)
                .and_then(|value| u32::try_from(value).ok()),
        }
    }
}

/// Sections worth offering in navigation for a scan. Both sections need at
/// least one ingested document; a scan without a document count is assumed to
/// have one.
pub fn section_availability(view: &ScanResultView) -> Vec<SectionId> {
    if view.document_count == Some(0) {
        return vec![];
    }
    let mut available = vec![SectionId::Deliverables];
    let has_structure_hint = view
        .offer_structure
        .as_ref()
        .is_some_and(|items| !items.is_empty())
        || view.submission_deadline.is_some()
        || view
            .deliverables
            .as_ref()
            .is_some_and(|items| !items.is_empty());
    if has_structure_hint {
        available.push(SectionId::OfferStructure);
    }
    available
}
