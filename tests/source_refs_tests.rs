use bidlens_lib::{
    core::types::{EvidenceChunk, EvidenceSet, SectionId, SourceKind, SourceRef},
    evidence::{
        binding::EvidenceBinding,
        sources::{
            build_evidence_sources, dedupe_source_refs, format_inline_sources_block,
            manual_review_source, CHUNK_WITHOUT_LOCATOR_LABEL, MANUAL_REVIEW_LABEL,
        },
    },
};
use proptest::prelude::*;

fn pdf_chunk(id: &str, page: Option<i64>, paragraph: Option<i64>) -> EvidenceChunk {
    EvidenceChunk {
        id: id.to_string(),
        content: format!("Inhalt {id}"),
        source_kind: SourceKind::RfpPdf,
        document: Some("Leistungsbeschreibung.pdf".to_string()),
        page,
        paragraph,
        url: None,
    }
}

fn web_chunk(id: &str, url: &str, content: &str) -> EvidenceChunk {
    EvidenceChunk {
        id: id.to_string(),
        content: content.to_string(),
        source_kind: SourceKind::WebPage,
        document: None,
        page: None,
        paragraph: None,
        url: Some(url.to_string()),
    }
}

fn review() -> SourceRef {
    manual_review_source(SectionId::Deliverables, "Preisblatt")
}

#[test]
fn resolves_pdf_and_web_locators_in_citation_order() {
    let evidence = EvidenceSet::from_chunks(vec![
        pdf_chunk("c1", Some(12), Some(3)),
        web_chunk("w1", "https://vergabe.example/faq", "Fragen   und\nAntworten"),
    ]);
    let binding = EvidenceBinding::evidenced(["w1", "c1"]).expect("binding");
    let refs = build_evidence_sources(&binding, &evidence, &review());
    assert_eq!(
        refs,
        vec![
            SourceRef::Web {
                url: "https://vergabe.example/faq".to_string(),
                excerpt: Some("Fragen und Antworten".to_string()),
            },
            SourceRef::RfpPdf {
                document: "Leistungsbeschreibung.pdf".to_string(),
                page: 12,
                paragraph: Some(3),
            },
        ]
    );
}

#[test]
fn web_sources_with_the_same_url_collapse() {
    let evidence = EvidenceSet::from_chunks(vec![
        web_chunk("w1", "https://vergabe.example/a", "erster Auszug"),
        web_chunk("w2", "https://vergabe.example/a", "zweiter Auszug"),
    ]);
    let binding = EvidenceBinding::evidenced(["w1", "w2"]).expect("binding");
    let refs = build_evidence_sources(&binding, &evidence, &review());
    assert_eq!(refs.len(), 1);
    assert!(matches!(&refs[0], SourceRef::Web { excerpt: Some(text), .. } if text == "erster Auszug"));
}

#[test]
fn unknown_or_unlocated_chunks_fall_back_to_assumption() {
    let evidence = EvidenceSet::from_chunks(vec![pdf_chunk("c1", None, None)]);
    let binding = EvidenceBinding::evidenced(["c1", "missing"]).expect("binding");
    let refs = build_evidence_sources(&binding, &evidence, &review());
    assert_eq!(refs.len(), 1);
    match &refs[0] {
        SourceRef::Assumption { label, rationale } => {
            assert_eq!(label, CHUNK_WITHOUT_LOCATOR_LABEL);
            assert!(rationale.contains("missing"));
        }
        other => panic!("expected assumption, got {other:?}"),
    }
}

#[test]
fn manual_review_binding_yields_review_assumption() {
    let refs = build_evidence_sources(&EvidenceBinding::NeedsReview, &EvidenceSet::default(), &review());
    assert_eq!(refs, vec![review()]);
    assert!(matches!(&refs[0], SourceRef::Assumption { label, .. } if label == MANUAL_REVIEW_LABEL));
}

#[test]
fn inline_block_lists_locators_then_assumptions() {
    let refs = vec![
        SourceRef::RfpPdf {
            document: "A.pdf".to_string(),
            page: 12,
            paragraph: None,
        },
        SourceRef::RfpPdf {
            document: "A.pdf".to_string(),
            page: 14,
            paragraph: Some(2),
        },
        review(),
    ];
    assert_eq!(
        format_inline_sources_block(&refs),
        format!(" [p.12; p.14, ¶2] (Annahme: {MANUAL_REVIEW_LABEL})")
    );
    assert_eq!(format_inline_sources_block(&[]), "");
}

fn source_strategy() -> impl Strategy<Value = SourceRef> {
    prop_oneof![
        (prop::sample::select(vec!["A.pdf", "B.pdf"]), 1i64..4, prop::option::of(1i64..3)).prop_map(
            |(document, page, paragraph)| SourceRef::RfpPdf {
                document: document.to_string(),
                page,
                paragraph,
            }
        ),
        (prop::sample::select(vec!["https://a.example", "https://b.example"]), prop::option::of("[a-z]{1,4}"))
            .prop_map(|(url, excerpt)| SourceRef::Web {
                url: url.to_string(),
                excerpt,
            }),
        prop::sample::select(vec!["x", "y"]).prop_map(|label| SourceRef::Assumption {
            label: label.to_string(),
            rationale: "r".to_string(),
        }),
    ]
}

proptest! {
    #[test]
    fn dedupe_is_idempotent_and_order_preserving(refs in prop::collection::vec(source_strategy(), 0..12)) {
        let once = dedupe_source_refs(refs.clone());
        let twice = dedupe_source_refs(once.clone());
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.len() <= refs.len());
        if let Some(first) = refs.first() {
            prop_assert_eq!(&once[0], first);
        }
    }
}
