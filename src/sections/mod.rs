pub mod deliverables;
pub mod estimator;
pub mod findings;
pub mod offer_structure;
pub mod pipeline;
pub mod prompts;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    core::{
        errors::AppResult,
        types::{
            EvidenceQuery, EvidenceRequest, EvidenceSet, FindingCategory, FindingKind, SectionId,
            SourceRef,
        },
        visualization::{ElementType, TreeBuilder, VisualizationTree},
    },
    evidence::{
        binding::EvidenceBinding,
        sources::{build_evidence_sources, format_inline_sources_block, manual_review_source},
    },
    providers::ExtractionContract,
    sections::{estimator::EstimateResult, findings::FindingDraft},
};

pub const MIN_SUMMARY_CHARS: usize = 40;
pub const MAX_HIGHLIGHTS: usize = 3;
pub const MAX_HIGHLIGHT_CHARS: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindingBounds {
    pub min: usize,
    pub max: usize,
}

/// Fields every section extraction carries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOverview {
    /// Factual summary of the section, at least 40 characters.
    pub summary: String,
    /// One to three short dashboard bullet points, each at most 140 characters.
    pub dashboard_highlights: Vec<String>,
    /// 0 to 100: how well the cited evidence supports the extraction.
    #[schemars(range(min = 0, max = 100))]
    pub confidence: f64,
}

impl ExtractionOverview {
    pub fn validate(&self) -> Result<(), String> {
        if self.summary.trim().chars().count() < MIN_SUMMARY_CHARS {
            return Err(format!("summary shorter than {MIN_SUMMARY_CHARS} characters"));
        }
        if self.dashboard_highlights.is_empty() || self.dashboard_highlights.len() > MAX_HIGHLIGHTS {
            return Err(format!(
                "expected 1 to {MAX_HIGHLIGHTS} dashboard highlights, got {}",
                self.dashboard_highlights.len()
            ));
        }
        if let Some(long) = self
            .dashboard_highlights
            .iter()
            .find(|text| text.chars().count() > MAX_HIGHLIGHT_CHARS)
        {
            return Err(format!("dashboard highlight longer than {MAX_HIGHLIGHT_CHARS} characters: {long}"));
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0..=100", self.confidence));
        }
        Ok(())
    }

    pub fn confidence_percent(&self) -> u8 {
        self.confidence.round().clamp(0.0, 100.0) as u8
    }
}

/// A free-text claim (risk, question, requirement) with its evidence binding.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimItem {
    pub text: String,
    #[serde(flatten)]
    pub binding: EvidenceBinding,
}

pub trait SectionExtraction: ExtractionContract + Sync {
    fn overview(&self) -> &ExtractionOverview;
}

/// What a section hands to `assemble`. `extraction` is `None` on the
/// degraded path.
pub struct AssemblyInput<'a, E> {
    pub scope_id: &'a str,
    pub extraction: Option<&'a E>,
    pub estimate: Option<&'a EstimateResult>,
    pub evidence: &'a EvidenceSet,
    pub confidence: u8,
}

impl<E> AssemblyInput<'_, E> {
    pub fn degraded(&self) -> bool {
        self.extraction.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct AssembledSection {
    pub visualization: VisualizationTree,
    pub highlights: Vec<String>,
    pub findings: Vec<FindingDraft>,
}

/// One analytical facet of a tender, run by `SectionPipeline`.
pub trait SectionDefinition: Send + Sync {
    type Extraction: SectionExtraction;

    fn id(&self) -> SectionId;
    fn queries(&self) -> &'static [&'static str];
    fn max_evidence(&self) -> usize;
    fn research_questions(&self) -> &'static [&'static str];
    fn bounds(&self) -> FindingBounds;
    fn system_prompt(&self) -> String;
    /// Subjects for manual-check findings used to reach `bounds().min`.
    fn padding_subjects(&self) -> &'static [&'static str];
    fn fallback_highlights(&self) -> Vec<String>;

    fn evidence_request(&self, scope_id: &str) -> EvidenceRequest {
        EvidenceRequest {
            scope_id: scope_id.to_string(),
            queries: self.queries().iter().map(|query| EvidenceQuery::new(*query)).collect(),
            max_total: self.max_evidence(),
        }
    }

    fn user_prompt(&self, evidence_context: &str) -> String {
        prompts::extraction_prompt(self.id().label(), evidence_context)
    }

    fn estimate(&self, _extraction: Option<&Self::Extraction>) -> AppResult<Option<EstimateResult>> {
        Ok(None)
    }

    fn assemble(&self, input: &AssemblyInput<'_, Self::Extraction>) -> AppResult<AssembledSection>;
}

/// Display text plus the citations behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct CitedLine {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub needs_review: bool,
}

impl CitedLine {
    pub fn rendered(&self) -> String {
        format!("{}{}", self.text, format_inline_sources_block(&self.sources))
    }
}

pub fn cite(
    section: SectionId,
    text: impl Into<String>,
    binding: &EvidenceBinding,
    evidence: &EvidenceSet,
) -> CitedLine {
    let text = text.into();
    let manual_review = manual_review_source(section, &text);
    CitedLine {
        sources: build_evidence_sources(binding, evidence, &manual_review),
        needs_review: binding.needs_manual_review(),
        text,
    }
}

/// A line that stands in for missing extraction output.
pub fn fallback_line(section: SectionId, text: impl Into<String>) -> CitedLine {
    let text = text.into();
    CitedLine {
        sources: vec![manual_review_source(section, &text)],
        needs_review: true,
        text,
    }
}

/// A generic recommendation that does not rest on tender evidence.
pub fn default_step_line(text: impl Into<String>) -> CitedLine {
    CitedLine {
        text: text.into(),
        sources: vec![SourceRef::Assumption {
            label: "Standardvorgehen".to_string(),
            rationale: "Allgemeine Empfehlung der Angebotsvorbereitung, nicht aus den Vergabeunterlagen abgeleitet."
                .to_string(),
        }],
        needs_review: false,
    }
}

/// Cited claims of one list, or a single fallback line when none are usable.
pub struct ClaimLines {
    pub lines: Vec<CitedLine>,
    pub fallback: bool,
}

impl ClaimLines {
    pub fn drafts(&self, category: FindingCategory, kind: FindingKind) -> Vec<FindingDraft> {
        let kind = if self.fallback { FindingKind::ManualCheck } else { kind };
        self.lines
            .iter()
            .map(|line| FindingDraft::from_line(line, category, kind))
            .collect()
    }
}

pub fn cited_claims(section: SectionId, claims: &[ClaimItem], evidence: &EvidenceSet) -> Vec<CitedLine> {
    claims
        .iter()
        .filter(|claim| !claim.text.trim().is_empty())
        .map(|claim| cite(section, claim.text.trim(), &claim.binding, evidence))
        .collect()
}

pub fn claim_lines(
    section: SectionId,
    claims: &[ClaimItem],
    evidence: &EvidenceSet,
    fallback: &str,
) -> ClaimLines {
    let lines = cited_claims(section, claims, evidence);
    if lines.is_empty() {
        ClaimLines {
            lines: vec![fallback_line(section, fallback)],
            fallback: true,
        }
    } else {
        ClaimLines {
            lines,
            fallback: false,
        }
    }
}

pub fn summary_text(section: SectionId, overview: Option<&ExtractionOverview>) -> String {
    match overview {
        Some(overview) => overview.summary.trim().to_string(),
        None => format!(
            "Für den Abschnitt {} liegt keine belastbare Extraktion vor. Alle Angaben sind manuell in den Vergabeunterlagen zu prüfen.",
            section.label()
        ),
    }
}

pub fn highlights_or_fallback<D: SectionDefinition + ?Sized>(
    section: &D,
    overview: Option<&ExtractionOverview>,
) -> Vec<String> {
    let highlights = overview
        .map(|overview| {
            overview
                .dashboard_highlights
                .iter()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .take(MAX_HIGHLIGHTS)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if highlights.is_empty() {
        section.fallback_highlights()
    } else {
        highlights
    }
}

/// Summary card with the confidence metric and, when degraded, a warning.
pub fn add_summary_card(
    builder: &mut TreeBuilder,
    section: SectionId,
    summary: &str,
    confidence: u8,
    degraded: bool,
) -> String {
    let mut children = vec![
        builder.add(
            "summary-text",
            ElementType::Markdown,
            json!({"content": summary}),
            vec![],
        ),
        builder.add(
            "summary-confidence",
            ElementType::Metric,
            json!({"label": "Konfidenz", "value": confidence, "unit": "%"}),
            vec![],
        ),
    ];
    if degraded {
        children.push(builder.add(
            "summary-degraded",
            ElementType::Callout,
            json!({
                "variant": "warning",
                "title": "Extraktion nicht verfügbar",
                "content": format!("{}: Ergebnisse beruhen auf Platzhaltern und müssen manuell geprüft werden.", section.label()),
            }),
            vec![],
        ));
    }
    builder.add(
        "summary",
        ElementType::Card,
        json!({"title": "Zusammenfassung"}),
        children,
    )
}

/// Card holding a list of cited lines; review-flagged lines carry a marker.
pub fn add_list_card(builder: &mut TreeBuilder, id: &str, title: &str, lines: &[CitedLine]) -> String {
    let items = lines
        .iter()
        .map(|line| {
            json!({
                "text": line.rendered(),
                "needsManualReview": line.needs_review,
                "sources": line.sources,
            })
        })
        .collect::<Vec<_>>();
    let mut children = vec![builder.add(
        format!("{id}-list"),
        ElementType::List,
        json!({"items": items}),
        vec![],
    )];
    let review_count = lines.iter().filter(|line| line.needs_review).count();
    if review_count > 0 {
        children.push(builder.add(
            format!("{id}-review"),
            ElementType::Badge,
            json!({"variant": "warning", "label": format!("{review_count} × manuelle Prüfung")}),
            vec![],
        ));
    }
    builder.add(id, ElementType::Card, json!({"title": title}), children)
}
