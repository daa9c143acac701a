use std::collections::HashSet;

use crate::{
    core::types::{EvidenceChunk, EvidenceSet, SectionId, SourceKind, SourceRef},
    evidence::{binding::EvidenceBinding, context::truncate_chars},
};

pub const MANUAL_REVIEW_LABEL: &str = "Manuelle Prüfung erforderlich";
pub const CHUNK_WITHOUT_LOCATOR_LABEL: &str = "Beleg ohne Fundstelle";
const DEFAULT_DOCUMENT_NAME: &str = "Ausschreibungsunterlagen";
const WEB_EXCERPT_CHARS: usize = 160;

/// Manual-review assumption shared by every section.
pub fn manual_review_source(section: SectionId, subject: &str) -> SourceRef {
    SourceRef::Assumption {
        label: MANUAL_REVIEW_LABEL.to_string(),
        rationale: format!(
            "{}: kein belastbarer Beleg für „{}“ gefunden; bitte in den Vergabeunterlagen prüfen.",
            section.label(),
            subject.trim()
        ),
    }
}

pub fn chunk_without_locator_source(ids: &[String]) -> SourceRef {
    SourceRef::Assumption {
        label: CHUNK_WITHOUT_LOCATOR_LABEL.to_string(),
        rationale: format!(
            "Zitierte Belegstellen ({}) sind ohne Seiten- oder URL-Angabe; Fundstelle manuell nachtragen.",
            ids.join(", ")
        ),
    }
}

pub fn chunk_source_ref(chunk: &EvidenceChunk) -> Option<SourceRef> {
    match chunk.source_kind {
        SourceKind::RfpPdf => chunk.page.map(|page| SourceRef::RfpPdf {
            document: chunk
                .document
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string()),
            page,
            paragraph: chunk.paragraph,
        }),
        SourceKind::WebPage => chunk
            .url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| {
                let excerpt = chunk.content.split_whitespace().collect::<Vec<_>>().join(" ");
                SourceRef::Web {
                    url: url.trim().to_string(),
                    excerpt: (!excerpt.is_empty())
                        .then(|| truncate_chars(&excerpt, WEB_EXCERPT_CHARS)),
                }
            }),
    }
}

/// Resolves an item's binding to citations. The result is never empty: a
/// manual-review binding yields the review assumption, and ids that resolve
/// to no locator yield the "chunk without locator" assumption.
pub fn build_evidence_sources(
    binding: &EvidenceBinding,
    evidence: &EvidenceSet,
    manual_review: &SourceRef,
) -> Vec<SourceRef> {
    let mut refs = binding
        .chunk_ids()
        .iter()
        .filter_map(|id| evidence.get(id))
        .filter_map(chunk_source_ref)
        .collect::<Vec<_>>();

    match binding {
        EvidenceBinding::NeedsReview => refs.push(manual_review.clone()),
        EvidenceBinding::Evidenced(ids) if refs.is_empty() => {
            refs.push(chunk_without_locator_source(ids.as_slice()))
        }
        EvidenceBinding::Evidenced(_) => {}
    }

    dedupe_source_refs(refs)
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum DedupeKey {
    Pdf(String, i64, Option<i64>),
    Web(String),
    Assumption(String, String),
}

impl From<&SourceRef> for DedupeKey {
    fn from(source: &SourceRef) -> Self {
        match source {
            SourceRef::RfpPdf {
                document,
                page,
                paragraph,
            } => Self::Pdf(document.clone(), *page, *paragraph),
            SourceRef::Web { url, .. } => Self::Web(url.clone()),
            SourceRef::Assumption { label, rationale } => {
                Self::Assumption(label.clone(), rationale.clone())
            }
        }
    }
}

/// Order-preserving structural dedup; the first occurrence wins.
pub fn dedupe_source_refs(refs: Vec<SourceRef>) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|source| seen.insert(DedupeKey::from(source)))
        .collect()
}

fn locator_label(source: &SourceRef) -> Option<String> {
    match source {
        SourceRef::RfpPdf {
            page,
            paragraph: Some(paragraph),
            ..
        } => Some(format!("p.{page}, ¶{paragraph}")),
        SourceRef::RfpPdf { page, .. } => Some(format!("p.{page}")),
        SourceRef::Web { url, .. } => Some(url.clone()),
        SourceRef::Assumption { .. } => None,
    }
}

/// Trailing citation text for a claim, e.g. ` [p.12; p.14, ¶2]` followed by
/// ` (Annahme: …)` per assumption. Empty input renders nothing.
pub fn format_inline_sources_block(refs: &[SourceRef]) -> String {
    let locators = refs.iter().filter_map(locator_label).collect::<Vec<_>>();
    let mut out = String::new();
    if !locators.is_empty() {
        out.push_str(" [");
        out.push_str(&locators.join("; "));
        out.push(']');
    }
    for source in refs {
        if let SourceRef::Assumption { label, .. } = source {
            out.push_str(" (Annahme: ");
            out.push_str(label);
            out.push(')');
        }
    }
    out
}
