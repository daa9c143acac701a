use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    core::{
        errors::AppResult,
        types::{EvidenceSet, FindingCategory, FindingKind, SectionId, SourceRef},
        visualization::{ElementType, TreeBuilder},
    },
    evidence::binding::EvidenceBinding,
    providers::ExtractionContract,
    sections::{
        add_list_card, add_summary_card, cite, cited_claims, claim_lines, default_step_line,
        estimator::{
            estimate_bid_deliverables_effort, render_estimate_markdown, DeliverableCategory,
            DeliverableInput, EstimateResult,
        },
        fallback_line,
        findings::FindingDraft,
        highlights_or_fallback, prompts, summary_text, AssembledSection, AssemblyInput, CitedLine,
        ClaimItem, ExtractionOverview, FindingBounds, SectionDefinition,
        SectionExtraction,
    },
};

pub const INVENTORY_FALLBACK: &str = "Pflichtbestandteile unklar";
const RISKS_FALLBACK: &str = "Keine belegten Risiken; Vergabeunterlagen auf Ausschlusskriterien prüfen";
const QUESTIONS_FALLBACK: &str = "Keine offenen Fragen belegt; Bieterfragenfrist prüfen und Unklarheiten sammeln";
const ESTIMATE_LABEL: &str = "Regelbasierte Aufwandsschätzung";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableItem {
    pub name: String,
    pub category: DeliverableCategory,
    pub mandatory: bool,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub page_limit: Option<u32>,
    #[serde(default)]
    pub submission_method: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub binding: EvidenceBinding,
}

impl DeliverableItem {
    fn describe(&self) -> String {
        let mut details = vec![self.category.label().to_string()];
        if let Some(limit) = self.page_limit.filter(|limit| *limit > 0) {
            details.push(format!("max. {limit} Seiten"));
        }
        for (label, value) in [
            ("Format", &self.format),
            ("Einreichung", &self.submission_method),
            ("Frist", &self.deadline),
        ] {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                details.push(format!("{label}: {value}"));
            }
        }
        let kind = if self.mandatory { "Pflichtbestandteil" } else { "Optionaler Bestandteil" };
        format!("{kind}: {} ({})", self.name.trim(), details.join("; "))
    }

    fn estimator_input(&self) -> DeliverableInput {
        DeliverableInput {
            name: self.name.trim().to_string(),
            category: self.category.as_str().to_string(),
            mandatory: self.mandatory,
            page_limit: self.page_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverablesExtraction {
    #[serde(flatten)]
    pub overview: ExtractionOverview,
    pub deliverables: Vec<DeliverableItem>,
    #[serde(default)]
    pub risks: Vec<ClaimItem>,
    #[serde(default)]
    pub open_questions: Vec<ClaimItem>,
    #[serde(default)]
    pub next_steps: Vec<ClaimItem>,
}

impl ExtractionContract for DeliverablesExtraction {
    fn validate(&self) -> Result<(), String> {
        self.overview.validate()?;
        if let Some(item) = self.deliverables.iter().find(|item| item.name.trim().is_empty()) {
            return Err(format!("deliverable without name ({})", item.category.as_str()));
        }
        Ok(())
    }
}

impl SectionExtraction for DeliverablesExtraction {
    fn overview(&self) -> &ExtractionOverview {
        &self.overview
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeliverablesSection;

/// Rows keep the deliverable's position, which is also its row in the
/// estimate. Names may repeat, so lookups go by position.
fn inventory_rows<'a>(
    section: SectionId,
    items: &'a [DeliverableItem],
    evidence: &EvidenceSet,
) -> Vec<(Option<(usize, &'a DeliverableItem)>, CitedLine)> {
    let mut rows = items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.name.trim().is_empty())
        .map(|(index, item)| {
            (Some((index, item)), cite(section, item.describe(), &item.binding, evidence))
        })
        .collect::<Vec<_>>();
    if rows.is_empty() {
        rows.push((None, fallback_line(section, INVENTORY_FALLBACK)));
    }
    rows
}

fn estimate_source() -> SourceRef {
    SourceRef::Assumption {
        label: ESTIMATE_LABEL.to_string(),
        rationale: "Abgeleitet aus der extrahierten Bestandteilsliste mit festen Stundensätzen je Kategorie."
            .to_string(),
    }
}

fn estimate_line(text: String) -> CitedLine {
    CitedLine {
        text,
        sources: vec![estimate_source()],
        needs_review: false,
    }
}

/// Deterministic next steps used when the extraction names none.
fn default_next_steps(estimate: Option<&EstimateResult>) -> Vec<CitedLine> {
    let mut steps = vec![
        default_step_line("Bid/No-Bid-Entscheidung auf Basis des Lieferumfangs treffen"),
        default_step_line("Verantwortliche je Pflichtbestandteil benennen"),
    ];
    if let Some(estimate) = estimate.filter(|estimate| estimate.totals.deliverable_count > 0) {
        steps.push(estimate_line(format!(
            "Kapazität von rund {:.1} PT bis zur Angebotsfrist einplanen",
            estimate.totals.effort_pt
        )));
    }
    steps
}

impl SectionDefinition for DeliverablesSection {
    type Extraction = DeliverablesExtraction;

    fn id(&self) -> SectionId {
        SectionId::Deliverables
    }

    fn queries(&self) -> &'static [&'static str] {
        prompts::DELIVERABLES_QUERIES
    }

    fn max_evidence(&self) -> usize {
        28
    }

    fn research_questions(&self) -> &'static [&'static str] {
        prompts::DELIVERABLES_RESEARCH_QUESTIONS
    }

    fn bounds(&self) -> FindingBounds {
        FindingBounds { min: 12, max: 20 }
    }

    fn system_prompt(&self) -> String {
        prompts::deliverables_system_prompt()
    }

    fn padding_subjects(&self) -> &'static [&'static str] {
        &[
            "Vollständigkeit der Pflichtunterlagen",
            "Einreichungsweg und Angebotsfrist",
            "Seitenbegrenzungen je Dokument",
            "Formvorgaben (Dateiformat, Signatur)",
            "Eignungsnachweise und Eigenerklärungen",
            "Preisblatt und Kalkulationsvorgaben",
            "Referenzanforderungen",
            "Vertragsbedingungen und Haftung",
            "Präsentations- oder Bietergesprächstermin",
            "Nachforderungsmöglichkeiten der Vergabestelle",
            "Bieterfragenfrist",
            "Gültigkeit der Unterlagen (Änderungen, Bekanntmachungen)",
        ]
    }

    fn fallback_highlights(&self) -> Vec<String> {
        vec!["Lieferumfang: manuelle Prüfung der Pflichtunterlagen erforderlich".to_string()]
    }

    fn estimate(&self, extraction: Option<&DeliverablesExtraction>) -> AppResult<Option<EstimateResult>> {
        let inputs = extraction
            .map(|extraction| {
                extraction
                    .deliverables
                    .iter()
                    .map(DeliverableItem::estimator_input)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        estimate_bid_deliverables_effort(&inputs).map(Some)
    }

    fn assemble(&self, input: &AssemblyInput<'_, DeliverablesExtraction>) -> AppResult<AssembledSection> {
        let section = self.id();
        let overview = input.extraction.map(SectionExtraction::overview);
        let items = input
            .extraction
            .map(|extraction| extraction.deliverables.as_slice())
            .unwrap_or(&[]);

        let inventory = inventory_rows(section, items, input.evidence);
        let risks = claim_lines(
            section,
            input.extraction.map(|e| e.risks.as_slice()).unwrap_or(&[]),
            input.evidence,
            RISKS_FALLBACK,
        );
        let questions = claim_lines(
            section,
            input.extraction.map(|e| e.open_questions.as_slice()).unwrap_or(&[]),
            input.evidence,
            QUESTIONS_FALLBACK,
        );
        let mut next_steps = cited_claims(
            section,
            input.extraction.map(|e| e.next_steps.as_slice()).unwrap_or(&[]),
            input.evidence,
        );
        if next_steps.is_empty() {
            next_steps = default_next_steps(input.estimate);
        }

        let summary = summary_text(section, overview);
        let mut builder = TreeBuilder::new();
        let summary_id = add_summary_card(&mut builder, section, &summary, input.confidence, input.degraded());

        let table_rows = inventory
            .iter()
            .map(|(entry, line)| {
                let estimate = entry.and_then(|(index, _)| {
                    input
                        .estimate
                        .and_then(|estimate| estimate.per_deliverable.get(index))
                });
                let item = entry.map(|(_, item)| item);
                json!({
                    "name": item.map(|item| item.name.trim().to_string()).unwrap_or_else(|| line.text.clone()),
                    "category": item.map(|item| item.category.label()).unwrap_or("-"),
                    "mandatory": item.map(|item| item.mandatory),
                    "pageLimit": item.and_then(|item| item.page_limit),
                    "format": item.and_then(|item| item.format.clone()),
                    "submissionMethod": item.and_then(|item| item.submission_method.clone()),
                    "deadline": item.and_then(|item| item.deadline.clone()),
                    "notes": item.and_then(|item| item.notes.clone()),
                    "effortHours": estimate.map(|row| row.effort_hours),
                    "needsManualReview": line.needs_review,
                    "sources": line.sources,
                })
            })
            .collect::<Vec<_>>();
        let table_id = builder.add(
            "inventory-table",
            ElementType::Table,
            json!({
                "columns": [
                    {"key": "name", "label": "Bestandteil"},
                    {"key": "category", "label": "Kategorie"},
                    {"key": "mandatory", "label": "Pflicht"},
                    {"key": "pageLimit", "label": "Seiten"},
                    {"key": "format", "label": "Format"},
                    {"key": "submissionMethod", "label": "Einreichung"},
                    {"key": "deadline", "label": "Frist"},
                    {"key": "effortHours", "label": "Aufwand (h)"}
                ],
                "rows": table_rows,
            }),
            vec![],
        );
        let inventory_id = builder.add(
            "inventory",
            ElementType::Card,
            json!({"title": "Pflichtbestandteile"}),
            vec![table_id],
        );

        let effort_id = match input.estimate.filter(|estimate| !estimate.per_deliverable.is_empty()) {
            Some(estimate) => {
                let metric = builder.add(
                    "effort-total",
                    ElementType::Metric,
                    json!({
                        "label": "Geschätzter Aufwand",
                        "value": estimate.totals.effort_hours,
                        "unit": "h",
                        "secondary": format!(
                            "{:.1} PT · {} Kalendertage · pessimistisch {:.1} h",
                            estimate.totals.effort_pt,
                            estimate.totals.calendar_days,
                            estimate.totals.pessimistic_hours
                        ),
                    }),
                    vec![],
                );
                let breakdown = builder.add(
                    "effort-breakdown",
                    ElementType::Markdown,
                    json!({"content": render_estimate_markdown(estimate)}),
                    vec![],
                );
                let assumptions = builder.add(
                    "effort-assumptions",
                    ElementType::List,
                    json!({
                        "items": estimate
                            .assumptions
                            .iter()
                            .map(|a| format!("{}: {}", a.label, a.rationale))
                            .chain(estimate.parallelization_hints.iter().cloned())
                            .collect::<Vec<_>>()
                    }),
                    vec![],
                );
                builder.add(
                    "effort",
                    ElementType::Card,
                    json!({"title": "Aufwand"}),
                    vec![metric, breakdown, assumptions],
                )
            }
            None => {
                let callout = builder.add(
                    "effort-unavailable",
                    ElementType::Callout,
                    json!({
                        "variant": "info",
                        "title": "Keine Aufwandsschätzung",
                        "content": "Ohne erkannte Bestandteile lässt sich kein Aufwand ableiten.",
                    }),
                    vec![],
                );
                builder.add("effort", ElementType::Card, json!({"title": "Aufwand"}), vec![callout])
            }
        };

        let risks_id = add_list_card(&mut builder, "risks", "Risiken", &risks.lines);
        let questions_id = add_list_card(&mut builder, "questions", "Offene Fragen", &questions.lines);
        let next_steps_id = add_list_card(&mut builder, "next-steps", "Nächste Schritte", &next_steps);
        builder.add(
            "root",
            ElementType::Section,
            json!({"title": section.label(), "scopeId": input.scope_id}),
            vec![summary_id, inventory_id, effort_id, risks_id, questions_id, next_steps_id],
        );
        let visualization = builder.build("root")?;

        let mut findings = inventory
            .iter()
            .map(|(item, line)| {
                let kind = if item.is_some() {
                    FindingKind::Deliverable
                } else {
                    FindingKind::ManualCheck
                };
                FindingDraft::from_line(line, FindingCategory::Fact, kind)
            })
            .collect::<Vec<_>>();
        if let Some(estimate) = input.estimate.filter(|estimate| !estimate.per_deliverable.is_empty()) {
            let total = estimate_line(format!(
                "Geschätzter Angebotsaufwand: {:.1} h ({:.1} PT, {} Kalendertage bei einem Bearbeiter), pessimistisch {:.1} h",
                estimate.totals.effort_hours,
                estimate.totals.effort_pt,
                estimate.totals.calendar_days,
                estimate.totals.pessimistic_hours
            ));
            findings.push(FindingDraft::from_line(&total, FindingCategory::Fact, FindingKind::Effort));
            findings.extend(estimate.parallelization_hints.iter().map(|hint| {
                FindingDraft::from_line(
                    &estimate_line(hint.clone()),
                    FindingCategory::Recommendation,
                    FindingKind::Effort,
                )
            }));
        }
        findings.extend(risks.drafts(FindingCategory::Fact, FindingKind::Risk));
        findings.extend(questions.drafts(FindingCategory::Recommendation, FindingKind::OpenQuestion));
        findings.extend(next_steps.iter().map(|line| {
            FindingDraft::from_line(line, FindingCategory::Recommendation, FindingKind::NextStep)
        }));

        Ok(AssembledSection {
            visualization,
            highlights: highlights_or_fallback(self, overview),
            findings,
        })
    }
}
