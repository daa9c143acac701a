use std::{sync::Arc, time::Duration, time::Instant};

use futures::future::join_all;
use uuid::Uuid;

use crate::{
    core::{
        config::AppConfig,
        errors::{AppError, AppResult},
        types::{
            EvidenceSet, PersistableFinding, RunPhase, SectionArtifacts, SectionFinding, SectionId,
            SectionRunError, SectionRunResult,
        },
    },
    db::store::FindingsStore,
    evidence::{context::build_evidence_context, EvidenceStore, WebResearchRequest, WebResearcher},
    providers::{
        embeddings::generate_embeddings_with_concurrency, generate_structured_output,
        EmbeddingProvider, StructuredGenerator, StructuredRequest,
    },
    sections::{
        deliverables::DeliverablesSection, findings::apply_finding_bounds,
        offer_structure::OfferStructureSection, AssemblyInput, SectionDefinition,
        SectionExtraction,
    },
};

const RESEARCH_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub max_output_tokens: u32,
    pub extraction_timeout: Duration,
    pub embedding_concurrency: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            extraction_timeout: config.extraction_timeout,
            embedding_concurrency: config.embedding_concurrency,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionRunOptions {
    pub allow_web_enrichment: bool,
}

struct RunOutcome {
    findings_count: usize,
    confidence: u8,
    degraded: bool,
}

#[derive(Clone)]
pub struct SectionPipeline {
    evidence: Arc<dyn EvidenceStore>,
    researcher: Arc<dyn WebResearcher>,
    generator: Arc<dyn StructuredGenerator>,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn FindingsStore>,
    settings: PipelineSettings,
}

fn enter(phase: &mut RunPhase, next: RunPhase, section_id: SectionId, run_id: &str) {
    tracing::debug!(
        section_id = section_id.as_str(),
        run_id = %run_id,
        from = phase.as_str(),
        to = next.as_str(),
        "section phase"
    );
    *phase = next;
}

impl SectionPipeline {
    pub fn new(
        evidence: Arc<dyn EvidenceStore>,
        researcher: Arc<dyn WebResearcher>,
        generator: Arc<dyn StructuredGenerator>,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn FindingsStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            evidence,
            researcher,
            generator,
            embeddings,
            store,
            settings,
        }
    }

    /// Runs one section end to end. Never fails: errors are reported in the
    /// result together with the phase they happened in.
    pub async fn run_section<S: SectionDefinition>(
        &self,
        section: &S,
        scope_id: &str,
        options: SectionRunOptions,
    ) -> SectionRunResult {
        let run_id = Uuid::new_v4().to_string();
        let section_id = section.id();
        let started = Instant::now();
        let mut phase = RunPhase::Start;
        tracing::info!(
            scope_id = %scope_id,
            section_id = section_id.as_str(),
            run_id = %run_id,
            web_enrichment = options.allow_web_enrichment,
            "section run started"
        );

        let outcome = self
            .execute(section, scope_id, &run_id, options, &mut phase)
            .await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    scope_id = %scope_id,
                    section_id = section_id.as_str(),
                    run_id = %run_id,
                    findings = outcome.findings_count,
                    confidence = outcome.confidence,
                    degraded = outcome.degraded,
                    latency_ms,
                    "section run finished"
                );
                SectionRunResult {
                    run_id,
                    scope_id: scope_id.to_string(),
                    section_id,
                    success: true,
                    degraded: outcome.degraded,
                    findings_count: outcome.findings_count,
                    confidence: outcome.confidence,
                    latency_ms,
                    error: None,
                }
            }
            Err(err) => {
                let failed_in = phase;
                enter(&mut phase, RunPhase::Failed, section_id, &run_id);
                tracing::error!(
                    scope_id = %scope_id,
                    section_id = section_id.as_str(),
                    run_id = %run_id,
                    phase = failed_in.as_str(),
                    code = err.code(),
                    error = %err,
                    "section run failed"
                );
                SectionRunResult {
                    run_id,
                    scope_id: scope_id.to_string(),
                    section_id,
                    success: false,
                    degraded: false,
                    findings_count: 0,
                    confidence: 0,
                    latency_ms,
                    error: Some(SectionRunError {
                        code: err.code().to_string(),
                        message: err.to_string(),
                        retryable: err.retryable(),
                        phase: failed_in,
                    }),
                }
            }
        }
    }

    pub async fn run_section_by_id(
        &self,
        section_id: SectionId,
        scope_id: &str,
        options: SectionRunOptions,
    ) -> SectionRunResult {
        match section_id {
            SectionId::Deliverables => self.run_section(&DeliverablesSection, scope_id, options).await,
            SectionId::OfferStructure => {
                self.run_section(&OfferStructureSection, scope_id, options)
                    .await
            }
        }
    }

    /// Runs independent sections of one scope concurrently. A section listed
    /// twice runs once.
    pub async fn run_sections(
        &self,
        scope_id: &str,
        section_ids: &[SectionId],
        options: SectionRunOptions,
    ) -> Vec<SectionRunResult> {
        let mut unique: Vec<SectionId> = Vec::with_capacity(section_ids.len());
        for section_id in section_ids {
            if unique.contains(section_id) {
                tracing::warn!(section_id = section_id.as_str(), "section requested twice, running once");
                continue;
            }
            unique.push(*section_id);
        }
        join_all(
            unique
                .into_iter()
                .map(|section_id| self.run_section_by_id(section_id, scope_id, options)),
        )
        .await
    }

    async fn execute<S: SectionDefinition>(
        &self,
        section: &S,
        scope_id: &str,
        run_id: &str,
        options: SectionRunOptions,
        phase: &mut RunPhase,
    ) -> AppResult<RunOutcome> {
        let section_id = section.id();

        enter(phase, RunPhase::ClearPrior, section_id, run_id);
        let removed = self.store.delete_section_artifacts(scope_id, section_id).await?;
        tracing::debug!(section_id = section_id.as_str(), removed, "cleared prior section artifacts");

        if options.allow_web_enrichment {
            enter(phase, RunPhase::Enrich, section_id, run_id);
            self.enrich(section, scope_id).await;
        }

        enter(phase, RunPhase::CollectEvidence, section_id, run_id);
        let evidence = self
            .evidence
            .collect_evidence_chunks(&section.evidence_request(scope_id))
            .await
            .map_err(|err| match err {
                AppError::EvidenceUnavailable(_) => err,
                other => AppError::EvidenceUnavailable(other.to_string()),
            })?;

        enter(phase, RunPhase::Extract, section_id, run_id);
        let extraction = self.extract(section, &evidence).await;
        let degraded = extraction.is_none();
        let confidence = extraction
            .as_ref()
            .map(|extraction| extraction.overview().confidence_percent())
            .unwrap_or(0);

        enter(phase, RunPhase::Estimate, section_id, run_id);
        let estimate = section.estimate(extraction.as_ref())?;

        enter(phase, RunPhase::Assemble, section_id, run_id);
        let assembled = section.assemble(&AssemblyInput {
            scope_id,
            extraction: extraction.as_ref(),
            estimate: estimate.as_ref(),
            evidence: &evidence,
            confidence,
        })?;
        let findings = apply_finding_bounds(
            assembled.findings,
            section.bounds(),
            section_id,
            section.padding_subjects(),
        )
        .into_iter()
        .map(|draft| draft.into_finding(section_id, confidence))
        .collect::<Vec<SectionFinding>>();

        enter(phase, RunPhase::Persist, section_id, run_id);
        let texts = findings
            .iter()
            .map(|finding| finding.content.clone())
            .collect::<Vec<_>>();
        let embeddings = generate_embeddings_with_concurrency(
            self.embeddings.as_ref(),
            &texts,
            self.settings.embedding_concurrency,
        )
        .await;
        let findings_count = findings.len();
        let artifacts = SectionArtifacts {
            scope_id: scope_id.to_string(),
            section_id,
            run_id: run_id.to_string(),
            visualization: assembled.visualization,
            highlights: assembled.highlights,
            findings: findings
                .into_iter()
                .zip(embeddings)
                .map(|(finding, embedding)| PersistableFinding { finding, embedding })
                .collect(),
        };
        self.store.persist_section_run(&artifacts).await?;

        enter(phase, RunPhase::Done, section_id, run_id);
        Ok(RunOutcome {
            findings_count,
            confidence,
            degraded,
        })
    }

    /// Best-effort fan-out; every failure is logged and dropped per task.
    async fn enrich<S: SectionDefinition>(&self, section: &S, scope_id: &str) {
        let section_id = section.id();
        let tasks = section.research_questions().iter().map(|question| {
            let request = WebResearchRequest {
                scope_id: scope_id.to_string(),
                section_id,
                question: (*question).to_string(),
                max_results: RESEARCH_MAX_RESULTS,
            };
            async move {
                match self.researcher.research(request).await {
                    Ok(chunks) => tracing::debug!(
                        section_id = section_id.as_str(),
                        question = %question,
                        found = chunks.len(),
                        "web research finished"
                    ),
                    Err(err) => tracing::warn!(
                        section_id = section_id.as_str(),
                        question = %question,
                        error = %err,
                        "web research failed, continuing without it"
                    ),
                }
            }
        });
        join_all(tasks).await;
    }

    /// `None` means degraded: no evidence, or the extractor failed.
    async fn extract<S: SectionDefinition>(
        &self,
        section: &S,
        evidence: &EvidenceSet,
    ) -> Option<S::Extraction> {
        let section_id = section.id();
        if evidence.is_empty() {
            tracing::warn!(
                section_id = section_id.as_str(),
                "no evidence chunks retrieved, continuing without extraction"
            );
            return None;
        }

        let result = match StructuredRequest::for_contract::<S::Extraction>(
            self.settings.model.clone(),
            section.system_prompt(),
            section.user_prompt(&build_evidence_context(evidence)),
            self.settings.max_output_tokens,
            self.settings.extraction_timeout,
        ) {
            Ok(request) => {
                generate_structured_output::<S::Extraction>(self.generator.as_ref(), &request).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(extraction) => Some(extraction),
            Err(err) => {
                let degraded = AppError::ExtractionDegraded(err.to_string());
                tracing::warn!(
                    section_id = section_id.as_str(),
                    code = degraded.code(),
                    cause = err.code(),
                    error = %degraded,
                    "extraction failed, continuing with fallback rows"
                );
                None
            }
        }
    }
}
