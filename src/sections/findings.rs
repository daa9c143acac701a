use crate::{
    core::types::{FindingCategory, FindingKind, FindingMetadata, SectionFinding, SectionId, SourceRef},
    evidence::sources::{dedupe_source_refs, format_inline_sources_block, manual_review_source},
    sections::{CitedLine, FindingBounds},
};

/// A finding before the section-level confidence is stamped on it.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingDraft {
    pub content: String,
    pub category: FindingCategory,
    pub kind: FindingKind,
    pub sources: Vec<SourceRef>,
}

impl FindingDraft {
    pub fn from_line(line: &CitedLine, category: FindingCategory, kind: FindingKind) -> Self {
        Self {
            content: line.rendered(),
            category,
            kind,
            sources: dedupe_source_refs(line.sources.clone()),
        }
    }

    pub fn manual_check(section: SectionId, subject: &str) -> Self {
        let sources = vec![manual_review_source(section, subject)];
        Self {
            content: format!(
                "Manuelle Prüfung: {subject}{}",
                format_inline_sources_block(&sources)
            ),
            category: FindingCategory::Recommendation,
            kind: FindingKind::ManualCheck,
            sources,
        }
    }

    pub fn into_finding(self, section_id: SectionId, confidence: u8) -> SectionFinding {
        SectionFinding {
            content: self.content,
            category: self.category,
            confidence: confidence.min(100),
            metadata: FindingMetadata {
                section_id,
                kind: Some(self.kind),
                sources: self.sources,
            },
        }
    }
}

/// Pads with manual-check findings up to `bounds.min` and truncates to
/// `bounds.max`. Padding cycles through `subjects`; repeated subjects get a
/// running number so no two padded findings read the same.
pub fn apply_finding_bounds(
    mut drafts: Vec<FindingDraft>,
    bounds: FindingBounds,
    section: SectionId,
    subjects: &[&str],
) -> Vec<FindingDraft> {
    let mut round = 0usize;
    let mut next = 0usize;
    while drafts.len() < bounds.min {
        let subject = subjects
            .get(next)
            .copied()
            .unwrap_or("Vollständigkeit der Vergabeunterlagen");
        let subject = if round == 0 {
            subject.to_string()
        } else {
            format!("{subject} ({})", round + 1)
        };
        drafts.push(FindingDraft::manual_check(section, &subject));
        next += 1;
        if next >= subjects.len() {
            next = 0;
            round += 1;
        }
    }
    drafts.truncate(bounds.max);
    drafts
}
