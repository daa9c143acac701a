use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use bidlens_lib::{
    core::{
        errors::{AppError, AppResult},
        types::{
            FindingCategory, FindingKind, FindingMetadata, PersistableFinding, SectionArtifacts,
            SectionFinding, SectionId, SourceRef,
        },
        visualization::{ElementType, TreeBuilder, VisualizationTree},
    },
    db::{
        repositories::findings::{count_findings, get_section_snapshot},
        store::{FindingsStore, SqliteFindingsStore},
        Database,
    },
};
use serde_json::json;

fn tree(title: &str) -> VisualizationTree {
    let mut builder = TreeBuilder::new();
    let text = builder.add("summary-text", ElementType::Markdown, json!({"content": title}), vec![]);
    builder.add("root", ElementType::Section, json!({"title": title}), vec![text]);
    builder.build("root").expect("tree")
}

fn finding(section_id: SectionId, content: &str) -> PersistableFinding {
    PersistableFinding {
        finding: SectionFinding {
            content: content.to_string(),
            category: FindingCategory::Fact,
            confidence: 72,
            metadata: FindingMetadata {
                section_id,
                kind: Some(FindingKind::Deliverable),
                sources: vec![SourceRef::RfpPdf {
                    document: "A.pdf".to_string(),
                    page: 4,
                    paragraph: None,
                }],
            },
        },
        embedding: Some(vec![0.25, -0.5]),
    }
}

fn artifacts(scope_id: &str, section_id: SectionId, run_id: &str, count: usize) -> SectionArtifacts {
    SectionArtifacts {
        scope_id: scope_id.to_string(),
        section_id,
        run_id: run_id.to_string(),
        visualization: tree(run_id),
        highlights: vec!["Zwei Pflichtbestandteile".to_string()],
        findings: (0..count)
            .map(|idx| finding(section_id, &format!("Befund {idx}")))
            .collect(),
    }
}

#[tokio::test]
async fn persisted_run_is_readable_as_snapshot() {
    let db = Database::in_memory().await.expect("db should initialize");
    let store = SqliteFindingsStore::new(db.clone());
    store
        .persist_section_run(&artifacts("tender-1", SectionId::Deliverables, "run-1", 3))
        .await
        .expect("persist");

    let snapshot = store
        .get_section_snapshot("tender-1", SectionId::Deliverables)
        .await
        .expect("snapshot")
        .expect("snapshot exists");
    assert_eq!(snapshot.run_id, "run-1");
    assert_eq!(snapshot.visualization, tree("run-1"));
    assert_eq!(snapshot.highlights, vec!["Zwei Pflichtbestandteile".to_string()]);
    assert_eq!(snapshot.findings.len(), 3);
    assert_eq!(snapshot.findings[0].finding.content, "Befund 0");
    assert_eq!(snapshot.findings[2].idx, 2);
    assert_eq!(snapshot.findings[0].embedding, Some(vec![0.25, -0.5]));
    assert_eq!(
        snapshot.findings[0].finding.metadata.kind,
        Some(FindingKind::Deliverable)
    );

    let other = get_section_snapshot(db.pool(), "tender-1", SectionId::OfferStructure)
        .await
        .expect("snapshot");
    assert!(other.is_none(), "sections are isolated");
}

#[tokio::test]
async fn delete_then_persist_replaces_previous_run() {
    let db = Database::in_memory().await.expect("db should initialize");
    let store = SqliteFindingsStore::new(db.clone());
    store
        .persist_section_run(&artifacts("tender-1", SectionId::Deliverables, "run-1", 5))
        .await
        .expect("first persist");
    store
        .persist_section_run(&artifacts("tender-1", SectionId::OfferStructure, "run-x", 2))
        .await
        .expect("other section");

    let removed = store
        .delete_section_artifacts("tender-1", SectionId::Deliverables)
        .await
        .expect("delete");
    assert_eq!(removed, 1 + 1 + 5);
    store
        .persist_section_run(&artifacts("tender-1", SectionId::Deliverables, "run-2", 4))
        .await
        .expect("second persist");

    assert_eq!(
        count_findings(db.pool(), "tender-1", SectionId::Deliverables)
            .await
            .expect("count"),
        4
    );
    assert_eq!(
        count_findings(db.pool(), "tender-1", SectionId::OfferStructure)
            .await
            .expect("count"),
        2
    );
    let snapshot = store
        .get_section_snapshot("tender-1", SectionId::Deliverables)
        .await
        .expect("snapshot")
        .expect("snapshot exists");
    assert_eq!(snapshot.run_id, "run-2");
    assert!(snapshot.findings.iter().all(|row| row.run_id == "run-2"));
}

#[tokio::test]
async fn failed_transaction_leaves_nothing_behind() {
    let db = Database::in_memory().await.expect("db should initialize");
    let store = SqliteFindingsStore::new(db.clone());
    // Duplicate highlight positions violate the primary key after the
    // visualization row was written inside the same transaction.
    let mut broken = artifacts("tender-1", SectionId::Deliverables, "run-1", 2);
    broken.highlights = vec!["a".to_string(), "b".to_string()];
    store
        .insert_dashboard_highlights("tender-1", SectionId::Deliverables, "run-0", &["alt".to_string()])
        .await
        .expect("seed highlight");

    let err = store.persist_section_run(&broken).await.expect_err("conflict");
    assert_eq!(err.code(), "DATABASE_ERROR");
    assert!(get_section_snapshot(db.pool(), "tender-1", SectionId::Deliverables)
        .await
        .expect("snapshot")
        .is_none());
    assert_eq!(
        count_findings(db.pool(), "tender-1", SectionId::Deliverables)
            .await
            .expect("count"),
        0
    );
}

/// Stores every write in memory and fails the findings insert on demand.
#[derive(Default)]
struct FlakyStore {
    writes: Mutex<Vec<&'static str>>,
    findings_calls: AtomicUsize,
}

#[async_trait]
impl FindingsStore for FlakyStore {
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
        self.writes.lock().expect("lock").push("visualization");
        Ok(())
    }

    async fn insert_dashboard_highlights(
        &self,
        _scope_id: &str,
        _section_id: SectionId,
        _run_id: &str,
        _highlights: &[String],
    ) -> AppResult<()> {
        self.writes.lock().expect("lock").push("highlights");
        Ok(())
    }

    async fn insert_findings(
        &self,
        _scope_id: &str,
        _section_id: SectionId,
        _run_id: &str,
        _rows: &[PersistableFinding],
    ) -> AppResult<()> {
        self.findings_calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Database("disk full".to_string()))
    }
}

#[tokio::test]
async fn sequential_persist_reports_partial_failure() {
    let store = FlakyStore::default();
    let err = store
        .persist_section_run(&artifacts("tender-1", SectionId::OfferStructure, "run-1", 1))
        .await
        .expect_err("findings insert fails");
    assert!(matches!(err, AppError::PersistencePartialFailure(_)));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(
        *store.writes.lock().expect("lock"),
        vec!["visualization", "highlights"]
    );
    assert_eq!(store.findings_calls.load(Ordering::SeqCst), 1);
}
