use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bidlens_lib::{
    core::{
        errors::{AppError, AppResult},
        types::{
            EvidenceChunk, EvidenceRequest, EvidenceSet, FindingKind, PersistableFinding, RunPhase,
            SectionId, SectionSnapshot, SourceKind, SourceRef,
        },
        visualization::{ElementType, VisualizationTree},
    },
    db::{
        repositories::findings::{count_findings, get_section_snapshot},
        store::{FindingsStore, SqliteFindingsStore},
        Database,
    },
    evidence::{
        EvidenceStore, SqliteEvidenceStore, WebResearchRequest, WebResearcher,
    },
    providers::{EmbeddingProvider, StructuredGenerator, StructuredRequest},
    sections::{
        pipeline::{PipelineSettings, SectionPipeline, SectionRunOptions},
        prompts,
    },
};
use serde_json::{json, Value};

const SCOPE: &str = "tender-42";

fn pdf_chunk(id: &str, content: &str, page: i64, paragraph: Option<i64>) -> EvidenceChunk {
    EvidenceChunk {
        id: id.to_string(),
        content: content.to_string(),
        source_kind: SourceKind::RfpPdf,
        document: Some("Vergabeunterlagen.pdf".to_string()),
        page: Some(page),
        paragraph,
        url: None,
    }
}

fn tender_chunks() -> Vec<EvidenceChunk> {
    vec![
        pdf_chunk("c1", "Das Preisblatt gemäß Anlage 4 ist mit dem Angebot einzureichen.", 3, None),
        pdf_chunk(
            "c2",
            "Das Fachkonzept ist auf 10 Seiten begrenzt und als PDF über die Vergabeplattform einzureichen.",
            5,
            Some(2),
        ),
        pdf_chunk("c3", "Unvollständige Angebote werden vom Verfahren ausgeschlossen.", 8, None),
    ]
}

fn deliverables_response() -> Value {
    json!({
        "summary": "Gefordert sind ein Fachkonzept, ein Preisblatt und eine Referenzliste; Abgabe elektronisch über die Plattform.",
        "dashboardHighlights": ["Zwei Pflichtbestandteile, eine optionale Referenzliste"],
        "confidence": 78,
        "deliverables": [
            {
                "name": "Fachkonzept",
                "category": "proposal_document",
                "mandatory": true,
                "pageLimit": 10,
                "format": "PDF",
                "evidenceChunkIds": ["c2"],
                "needsManualReview": false
            },
            {
                "name": "Preisblatt",
                "category": "commercial",
                "mandatory": true,
                "evidenceChunkIds": ["c1"],
                "needsManualReview": false
            },
            {
                "name": "Referenzliste",
                "category": "reference",
                "mandatory": false,
                "evidenceChunkIds": [],
                "needsManualReview": true
            }
        ],
        "risks": [
            {
                "text": "Unvollständige Angebote führen zum Ausschluss",
                "evidenceChunkIds": ["c3"],
                "needsManualReview": false
            }
        ],
        "openQuestions": [
            {
                "text": "Ist die Referenzliste wertungsrelevant?",
                "evidenceChunkIds": [],
                "needsManualReview": true
            }
        ],
        "nextSteps": []
    })
}

fn empty_deliverables_response() -> Value {
    json!({
        "summary": "Die vorliegenden Auszüge enthalten keine belastbaren Angaben zu einzureichenden Unterlagen.",
        "dashboardHighlights": ["Keine Bestandteile belegt"],
        "confidence": 20,
        "deliverables": []
    })
}

fn offer_structure_response() -> Value {
    json!({
        "summary": "Das Angebot ist mit Deckblatt und Fachkonzept in vorgegebener Reihenfolge einzureichen.",
        "dashboardHighlights": ["Gliederung: Deckblatt, Fachkonzept"],
        "confidence": 64,
        "structure": [
            {
                "title": "Fachkonzept",
                "required": true,
                "order": 2,
                "pageLimit": 10,
                "evidenceChunkIds": ["c2"],
                "needsManualReview": false
            },
            {
                "title": "Deckblatt",
                "required": true,
                "order": 1,
                "evidenceChunkIds": ["c1"],
                "needsManualReview": false
            }
        ],
        "formalRequirements": [
            {
                "text": "Einreichung als PDF über die Vergabeplattform",
                "evidenceChunkIds": ["c2"],
                "needsManualReview": false
            }
        ]
    })
}

/// Answers per section, keyed by the system prompt of the request.
struct ScriptedGenerator {
    deliverables: Value,
    offer_structure: Value,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(deliverables: Value) -> Self {
        Self {
            deliverables,
            offer_structure: offer_structure_response(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(deliverables_response())
        }
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate_json(&self, request: &StructuredRequest) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.temperature, 0.0);
        assert!(request.prompt.contains("[chunk:"), "evidence context is embedded");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if request.system == prompts::deliverables_system_prompt() {
            Ok(self.deliverables.clone())
        } else {
            Ok(self.offer_structure.clone())
        }
    }
}

struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(vec![text.chars().count() as f32, 1.0])
    }
}

#[derive(Default)]
struct FailingResearcher {
    calls: AtomicUsize,
}

#[async_trait]
impl WebResearcher for FailingResearcher {
    async fn research(&self, _request: WebResearchRequest) -> AppResult<Vec<EvidenceChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Network("search backend unreachable".to_string()))
    }
}

struct FailingEvidence;

#[async_trait]
impl EvidenceStore for FailingEvidence {
    async fn collect_evidence_chunks(&self, _request: &EvidenceRequest) -> AppResult<EvidenceSet> {
        Err(AppError::Database("database is locked".to_string()))
    }
}

/// Clears fine but refuses every write.
struct ReadOnlyStore;

#[async_trait]
impl FindingsStore for ReadOnlyStore {
    async fn delete_section_artifacts(&self, _scope_id: &str, _section_id: SectionId) -> AppResult<u64> {
        Ok(0)
    }

    async fn insert_visualization(
        &self,
        _scope_id: &str,
        _section_id: SectionId,
        _run_id: &str,
        _tree: &VisualizationTree,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn insert_dashboard_highlights(
        &self,
        _scope_id: &str,
        _section_id: SectionId,
        _run_id: &str,
        _highlights: &[String],
    ) -> AppResult<()> {
        Err(AppError::Database("attempt to write a readonly database".to_string()))
    }

    async fn insert_findings(
        &self,
        _scope_id: &str,
        _section_id: SectionId,
        _run_id: &str,
        _rows: &[PersistableFinding],
    ) -> AppResult<()> {
        Ok(())
    }
}

fn settings(timeout: Duration) -> PipelineSettings {
    PipelineSettings {
        model: "test-model".to_string(),
        max_output_tokens: 2048,
        extraction_timeout: timeout,
        embedding_concurrency: 2,
    }
}

struct Harness {
    db: Database,
    pipeline: SectionPipeline,
    researcher: Arc<FailingResearcher>,
}

async fn harness_with(generator: Arc<dyn StructuredGenerator>, timeout: Duration, seed: bool) -> Harness {
    let db = Database::in_memory().await.expect("db should initialize");
    let evidence = SqliteEvidenceStore::new(db.clone());
    if seed {
        evidence
            .insert_chunks(SCOPE, &tender_chunks())
            .await
            .expect("seed evidence");
    }
    let researcher = Arc::new(FailingResearcher::default());
    let pipeline = SectionPipeline::new(
        Arc::new(evidence),
        researcher.clone(),
        generator,
        Arc::new(FixedEmbedder),
        Arc::new(SqliteFindingsStore::new(db.clone())),
        settings(timeout),
    );
    Harness {
        db,
        pipeline,
        researcher,
    }
}

async fn harness(generator: ScriptedGenerator) -> Harness {
    harness_with(Arc::new(generator), Duration::from_secs(5), true).await
}

async fn snapshot(db: &Database, section_id: SectionId) -> SectionSnapshot {
    get_section_snapshot(db.pool(), SCOPE, section_id)
        .await
        .expect("snapshot query")
        .expect("snapshot exists")
}

fn kinds(snapshot: &SectionSnapshot) -> Vec<FindingKind> {
    snapshot
        .findings
        .iter()
        .filter_map(|row| row.finding.metadata.kind)
        .collect()
}

#[tokio::test]
async fn deliverables_run_persists_cited_findings_and_dashboard() {
    let harness = harness(ScriptedGenerator::new(deliverables_response())).await;
    let result = harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert!(!result.degraded);
    assert_eq!(result.confidence, 78);
    assert!((12..=20).contains(&result.findings_count));

    let snapshot = snapshot(&harness.db, SectionId::Deliverables).await;
    assert_eq!(snapshot.run_id, result.run_id);
    assert_eq!(snapshot.findings.len(), result.findings_count);
    assert_eq!(
        snapshot.visualization.root_children(),
        ["summary", "inventory", "effort", "risks", "questions", "next-steps"]
    );
    assert_eq!(
        snapshot.visualization.elements["effort-total"].element_type,
        ElementType::Metric
    );
    assert!(!snapshot.visualization.elements.contains_key("summary-degraded"));
    assert_eq!(
        snapshot.highlights,
        vec!["Zwei Pflichtbestandteile, eine optionale Referenzliste".to_string()]
    );

    for row in &snapshot.findings {
        assert!(!row.finding.metadata.sources.is_empty(), "{} has no source", row.finding.content);
        assert_eq!(row.finding.confidence, 78);
        assert_eq!(row.finding.metadata.section_id, SectionId::Deliverables);
        assert!(row.embedding.is_some());
    }

    let concept = snapshot
        .findings
        .iter()
        .find(|row| row.finding.content.contains("Fachkonzept"))
        .expect("concept finding");
    assert!(concept.finding.content.contains("[p.5, ¶2]"));
    assert!(concept.finding.metadata.sources.contains(&SourceRef::RfpPdf {
        document: "Vergabeunterlagen.pdf".to_string(),
        page: 5,
        paragraph: Some(2),
    }));

    let references = snapshot
        .findings
        .iter()
        .find(|row| row.finding.content.contains("Referenzliste"))
        .expect("reference finding");
    assert!(references.finding.content.contains("(Annahme: Manuelle Prüfung erforderlich)"));

    let kinds = kinds(&snapshot);
    assert_eq!(kinds.iter().filter(|kind| **kind == FindingKind::Deliverable).count(), 3);
    assert!(kinds.contains(&FindingKind::Effort));
    assert!(kinds.contains(&FindingKind::Risk));
    assert!(kinds.contains(&FindingKind::OpenQuestion));
    assert!(kinds.contains(&FindingKind::NextStep));
}

#[tokio::test]
async fn extractor_timeout_degrades_instead_of_failing() {
    let harness = harness_with(
        Arc::new(ScriptedGenerator::slow(Duration::from_millis(500))),
        Duration::from_millis(20),
        true,
    )
    .await;
    let result = harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(result.success);
    assert!(result.degraded);
    assert_eq!(result.confidence, 0);
    assert_eq!(result.findings_count, 12);

    let snapshot = snapshot(&harness.db, SectionId::Deliverables).await;
    assert!(snapshot.visualization.elements.contains_key("summary-degraded"));
    assert!(snapshot.visualization.elements.contains_key("effort-unavailable"));
    assert!(kinds(&snapshot).contains(&FindingKind::ManualCheck));
    assert!(snapshot
        .findings
        .iter()
        .any(|row| row.finding.content.starts_with("Pflichtbestandteile unklar")));
    assert!(!snapshot.highlights.is_empty());
}

#[tokio::test]
async fn missing_evidence_skips_the_extractor() {
    let generator = Arc::new(ScriptedGenerator::new(deliverables_response()));
    let harness = harness_with(generator.clone(), Duration::from_secs(5), false).await;
    let result = harness
        .pipeline
        .run_section_by_id(SectionId::OfferStructure, SCOPE, SectionRunOptions::default())
        .await;

    assert!(result.success);
    assert!(result.degraded);
    assert_eq!(result.findings_count, 10);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_extraction_is_padded_to_minimum_depth() {
    let harness = harness(ScriptedGenerator::new(empty_deliverables_response())).await;
    let result = harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(result.success);
    assert!(!result.degraded);
    assert_eq!(result.findings_count, 12);
    let snapshot = snapshot(&harness.db, SectionId::Deliverables).await;
    let manual_checks = kinds(&snapshot)
        .into_iter()
        .filter(|kind| *kind == FindingKind::ManualCheck)
        .count();
    assert!(manual_checks >= 7, "got {manual_checks} manual checks");
    let mut contents = snapshot
        .findings
        .iter()
        .map(|row| row.finding.content.clone())
        .collect::<Vec<_>>();
    contents.sort();
    contents.dedup();
    assert_eq!(contents.len(), 12, "padding never repeats a finding");
}

#[tokio::test]
async fn rerun_replaces_previous_artifacts() {
    let harness = harness(ScriptedGenerator::new(deliverables_response())).await;
    let first = harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;
    let second = harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(first.success && second.success);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.findings_count, second.findings_count);
    let stored = count_findings(harness.db.pool(), SCOPE, SectionId::Deliverables)
        .await
        .expect("count");
    assert_eq!(stored as usize, second.findings_count);
    let snapshot = snapshot(&harness.db, SectionId::Deliverables).await;
    assert_eq!(snapshot.run_id, second.run_id);
    assert_eq!(snapshot.highlights.len(), 1);
}

#[tokio::test]
async fn evidence_failure_is_reported_with_phase() {
    let db = Database::in_memory().await.expect("db should initialize");
    let pipeline = SectionPipeline::new(
        Arc::new(FailingEvidence),
        Arc::new(FailingResearcher::default()),
        Arc::new(ScriptedGenerator::new(deliverables_response())),
        Arc::new(FixedEmbedder),
        Arc::new(SqliteFindingsStore::new(db.clone())),
        settings(Duration::from_secs(5)),
    );
    let result = pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.findings_count, 0);
    let error = result.error.expect("error details");
    assert_eq!(error.code, "EVIDENCE_UNAVAILABLE");
    assert_eq!(error.phase, RunPhase::CollectEvidence);
    assert!(error.message.contains("database is locked"));
    assert!(get_section_snapshot(db.pool(), SCOPE, SectionId::Deliverables)
        .await
        .expect("snapshot query")
        .is_none());
}

#[tokio::test]
async fn persistence_failure_is_reported_with_phase() {
    let db = Database::in_memory().await.expect("db should initialize");
    let evidence = SqliteEvidenceStore::new(db.clone());
    evidence
        .insert_chunks(SCOPE, &tender_chunks())
        .await
        .expect("seed evidence");
    let pipeline = SectionPipeline::new(
        Arc::new(evidence),
        Arc::new(FailingResearcher::default()),
        Arc::new(ScriptedGenerator::new(deliverables_response())),
        Arc::new(FixedEmbedder),
        Arc::new(ReadOnlyStore),
        settings(Duration::from_secs(5)),
    );
    let result = pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;

    assert!(!result.success);
    let error = result.error.expect("error details");
    assert_eq!(error.code, "PERSISTENCE_PARTIAL_FAILURE");
    assert_eq!(error.phase, RunPhase::Persist);
    assert!(!error.retryable);
}

#[tokio::test]
async fn failed_enrichment_does_not_block_the_run() {
    let harness = harness(ScriptedGenerator::new(deliverables_response())).await;
    let result = harness
        .pipeline
        .run_section_by_id(
            SectionId::Deliverables,
            SCOPE,
            SectionRunOptions {
                allow_web_enrichment: true,
            },
        )
        .await;

    assert!(result.success);
    assert!(!result.degraded);
    assert_eq!(
        harness.researcher.calls.load(Ordering::SeqCst),
        prompts::DELIVERABLES_RESEARCH_QUESTIONS.len()
    );

    harness
        .pipeline
        .run_section_by_id(SectionId::Deliverables, SCOPE, SectionRunOptions::default())
        .await;
    assert_eq!(
        harness.researcher.calls.load(Ordering::SeqCst),
        prompts::DELIVERABLES_RESEARCH_QUESTIONS.len(),
        "enrichment only runs when allowed"
    );
}

#[tokio::test]
async fn sections_run_independently_and_once_each() {
    let harness = harness(ScriptedGenerator::new(deliverables_response())).await;
    let results = harness
        .pipeline
        .run_sections(
            SCOPE,
            &[SectionId::Deliverables, SectionId::OfferStructure, SectionId::Deliverables],
            SectionRunOptions::default(),
        )
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|result| result.success && !result.degraded));
    assert_eq!(results[0].section_id, SectionId::Deliverables);
    assert_eq!(results[1].section_id, SectionId::OfferStructure);

    let structure = snapshot(&harness.db, SectionId::OfferStructure).await;
    assert_eq!(
        structure.visualization.root_children(),
        [
            "summary",
            "structure",
            "formal-requirements",
            "risks",
            "questions",
            "next-steps"
        ]
    );
    assert!((10..=20).contains(&structure.findings.len()));
    let first_item = structure
        .findings
        .iter()
        .find(|row| row.finding.metadata.kind == Some(FindingKind::StructureItem))
        .expect("structure item");
    assert!(first_item.finding.content.contains("Deckblatt"), "explicit order wins");
    assert!(structure
        .findings
        .iter()
        .all(|row| row.finding.metadata.section_id == SectionId::OfferStructure));

    let deliverables = snapshot(&harness.db, SectionId::Deliverables).await;
    assert!(deliverables
        .findings
        .iter()
        .all(|row| row.finding.metadata.section_id == SectionId::Deliverables));
}
