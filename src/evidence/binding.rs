use std::borrow::Cow;

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Non-empty list of evidence chunk ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIds(Vec<String>);

impl ChunkIds {
    /// Blank ids are dropped; `None` when nothing remains.
    pub fn new<I, S>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids
            .into_iter()
            .map(Into::into)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>();
        if ids.is_empty() {
            None
        } else {
            Some(Self(ids))
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// How an extracted item is grounded: either by at least one evidence chunk
/// or by an explicit manual-review flag, never both and never neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EvidenceBindingWire", into = "EvidenceBindingWire")]
pub enum EvidenceBinding {
    Evidenced(ChunkIds),
    NeedsReview,
}

impl EvidenceBinding {
    pub fn evidenced<I, S>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChunkIds::new(ids).map(Self::Evidenced)
    }

    pub fn chunk_ids(&self) -> &[String] {
        match self {
            Self::Evidenced(ids) => ids.as_slice(),
            Self::NeedsReview => &[],
        }
    }

    pub fn needs_manual_review(&self) -> bool {
        matches!(self, Self::NeedsReview)
    }
}

/// Shape the model emits and the JSON schema advertises.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBindingWire {
    /// Ids of the evidence chunks that support this item. Must be empty if and
    /// only if needsManualReview is true.
    pub evidence_chunk_ids: Vec<String>,
    /// True when no provided chunk supports this item.
    pub needs_manual_review: bool,
}

impl TryFrom<EvidenceBindingWire> for EvidenceBinding {
    type Error = String;

    fn try_from(value: EvidenceBindingWire) -> Result<Self, Self::Error> {
        let ids = ChunkIds::new(value.evidence_chunk_ids);
        match (ids, value.needs_manual_review) {
            (Some(ids), false) => Ok(Self::Evidenced(ids)),
            (None, true) => Ok(Self::NeedsReview),
            (Some(_), true) => {
                Err("item cites evidence and requests manual review at the same time".to_string())
            }
            (None, false) => {
                Err("item cites no evidence but does not request manual review".to_string())
            }
        }
    }
}

impl From<EvidenceBinding> for EvidenceBindingWire {
    fn from(value: EvidenceBinding) -> Self {
        match value {
            EvidenceBinding::Evidenced(ids) => Self {
                evidence_chunk_ids: ids.0,
                needs_manual_review: false,
            },
            EvidenceBinding::NeedsReview => Self {
                evidence_chunk_ids: vec![],
                needs_manual_review: true,
            },
        }
    }
}

impl JsonSchema for EvidenceBinding {
    fn inline_schema() -> bool {
        true
    }

    fn schema_name() -> Cow<'static, str> {
        "EvidenceBinding".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        EvidenceBindingWire::json_schema(generator)
    }
}
