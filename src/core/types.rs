use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::visualization::VisualizationTree;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RfpPdf,
    WebPage,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RfpPdf => "rfp_pdf",
            Self::WebPage => "web_page",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "rfp_pdf" | "pdf" => Some(Self::RfpPdf),
            "web_page" | "web" => Some(Self::WebPage),
            _ => None,
        }
    }
}

/// A retrieved span of source text. Extraction output refers to chunks by
/// `id` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceChunk {
    /// Blank or missing ids are replaced by `stable_chunk_id` on import.
    #[serde(default)]
    pub id: String,
    pub content: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub paragraph: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceQuery {
    pub query: String,
}

impl EvidenceQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub scope_id: String,
    pub queries: Vec<EvidenceQuery>,
    pub max_total: usize,
}

/// Ranked chunks of one pipeline run plus an id index into them.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    chunks: Vec<EvidenceChunk>,
    by_id: HashMap<String, usize>,
}

impl EvidenceSet {
    /// Keeps the first chunk for every id and drops the rest.
    pub fn from_chunks(chunks: Vec<EvidenceChunk>) -> Self {
        let mut set = Self::default();
        for chunk in chunks {
            if set.by_id.contains_key(&chunk.id) {
                continue;
            }
            set.by_id.insert(chunk.id.clone(), set.chunks.len());
            set.chunks.push(chunk);
        }
        set
    }

    pub fn chunks(&self) -> &[EvidenceChunk] {
        &self.chunks
    }

    pub fn get(&self, id: &str) -> Option<&EvidenceChunk> {
        self.by_id.get(id).map(|idx| &self.chunks[*idx])
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A citation attached to a user-facing claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    RfpPdf {
        document: String,
        page: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paragraph: Option<i64>,
    },
    Web {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        excerpt: Option<String>,
    },
    Assumption {
        label: String,
        rationale: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SectionId {
    Deliverables,
    OfferStructure,
}

impl SectionId {
    pub const ALL: [SectionId; 2] = [SectionId::Deliverables, SectionId::OfferStructure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deliverables => "deliverables",
            Self::OfferStructure => "offer-structure",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "deliverables" => Some(Self::Deliverables),
            "offer-structure" => Some(Self::OfferStructure),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Deliverables => "Lieferumfang",
            Self::OfferStructure => "Angebotsstruktur",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Fact,
    Recommendation,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Recommendation => "recommendation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fact" => Some(Self::Fact),
            "recommendation" => Some(Self::Recommendation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Deliverable,
    Effort,
    StructureItem,
    FormalRequirement,
    Risk,
    OpenQuestion,
    NextStep,
    ManualCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FindingMetadata {
    pub section_id: SectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FindingKind>,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionFinding {
    pub content: String,
    pub category: FindingCategory,
    pub confidence: u8,
    pub metadata: FindingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFinding {
    pub id: String,
    pub run_id: String,
    pub idx: i64,
    pub finding: SectionFinding,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PersistableFinding {
    pub finding: SectionFinding,
    pub embedding: Option<Vec<f32>>,
}

/// Everything one section run writes, keyed by `(scope_id, section_id)`.
#[derive(Debug, Clone)]
pub struct SectionArtifacts {
    pub scope_id: String,
    pub section_id: SectionId,
    pub run_id: String,
    pub visualization: VisualizationTree,
    pub highlights: Vec<String>,
    pub findings: Vec<PersistableFinding>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Start,
    ClearPrior,
    Enrich,
    CollectEvidence,
    Extract,
    Estimate,
    Assemble,
    Persist,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ClearPrior => "clear_prior",
            Self::Enrich => "enrich",
            Self::CollectEvidence => "collect_evidence",
            Self::Extract => "extract",
            Self::Estimate => "estimate",
            Self::Assemble => "assemble",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRunError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub phase: RunPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRunResult {
    pub run_id: String,
    pub scope_id: String,
    pub section_id: SectionId,
    pub success: bool,
    pub degraded: bool,
    pub findings_count: usize,
    pub confidence: u8,
    pub latency_ms: i64,
    pub error: Option<SectionRunError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSnapshot {
    pub scope_id: String,
    pub section_id: SectionId,
    pub run_id: String,
    pub visualization: VisualizationTree,
    pub highlights: Vec<String>,
    pub findings: Vec<StoredFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProviderKeyResponse {
    pub stored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSectionsResponse {
    pub scope_id: String,
    pub results: Vec<SectionRunResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportChunksResponse {
    pub scope_id: String,
    pub imported: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSectionSnapshotResponse {
    pub snapshot: Option<SectionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAvailabilityResponse {
    pub available: Vec<SectionId>,
}
