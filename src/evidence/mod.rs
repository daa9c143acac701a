pub mod binding;
pub mod context;
pub mod ranking;
pub mod sources;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        errors::AppResult,
        types::{EvidenceChunk, EvidenceRequest, EvidenceSet, SectionId},
    },
    db::{repositories::evidence, Database},
};

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Ranked, deduplicated chunks for all queries, capped at `max_total`.
    async fn collect_evidence_chunks(&self, request: &EvidenceRequest) -> AppResult<EvidenceSet>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebResearchRequest {
    pub scope_id: String,
    pub section_id: SectionId,
    pub question: String,
    pub max_results: usize,
}

/// Best-effort enrichment. Implementations index what they find so a later
/// `collect_evidence_chunks` can pick it up; the returned chunks are
/// informational.
#[async_trait]
pub trait WebResearcher: Send + Sync {
    async fn research(&self, request: WebResearchRequest) -> AppResult<Vec<EvidenceChunk>>;
}

#[derive(Debug, Clone, Default)]
pub struct DisabledWebResearch;

#[async_trait]
impl WebResearcher for DisabledWebResearch {
    async fn research(&self, request: WebResearchRequest) -> AppResult<Vec<EvidenceChunk>> {
        tracing::debug!(
            scope_id = %request.scope_id,
            section_id = request.section_id.as_str(),
            "web research disabled, skipping"
        );
        Ok(vec![])
    }
}

#[derive(Clone)]
pub struct SqliteEvidenceStore {
    db: Database,
}

impl SqliteEvidenceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert_chunks(&self, scope_id: &str, chunks: &[EvidenceChunk]) -> AppResult<usize> {
        evidence::insert_chunks(self.db.pool(), scope_id, chunks).await
    }
}

#[async_trait]
impl EvidenceStore for SqliteEvidenceStore {
    async fn collect_evidence_chunks(&self, request: &EvidenceRequest) -> AppResult<EvidenceSet> {
        let stored = evidence::list_scope_chunks(self.db.pool(), &request.scope_id).await?;
        let ranked = ranking::rank_chunks(&stored, &request.queries, request.max_total);
        tracing::debug!(
            scope_id = %request.scope_id,
            stored = stored.len(),
            selected = ranked.len(),
            "collected evidence chunks"
        );
        Ok(EvidenceSet::from_chunks(ranked))
    }
}
