use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    core::{
        errors::AppResult,
        types::{EvidenceSet, FindingCategory, FindingKind, SectionId},
        visualization::{ElementType, TreeBuilder},
    },
    evidence::binding::EvidenceBinding,
    providers::ExtractionContract,
    sections::{
        add_list_card, add_summary_card, cite, cited_claims, claim_lines, default_step_line,
        fallback_line,
        findings::FindingDraft,
        highlights_or_fallback, prompts, summary_text, AssembledSection, AssemblyInput, CitedLine,
        ClaimItem, ExtractionOverview, FindingBounds, SectionDefinition, SectionExtraction,
    },
};

pub const STRUCTURE_FALLBACK: &str = "Angebotsstruktur unklar";
const FORMAL_FALLBACK: &str = "Formale Anforderungen nicht belegt; Form, Signatur und Dateiformate manuell prüfen";
const RISKS_FALLBACK: &str = "Keine belegten Formrisiken; Ausschlussgründe wegen Formfehlern manuell prüfen";
const QUESTIONS_FALLBACK: &str = "Keine offenen Fragen belegt; unklare Gliederungsvorgaben als Bieterfrage sammeln";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureItem {
    pub title: String,
    pub required: bool,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub page_limit: Option<u32>,
    #[serde(default)]
    pub format_requirements: Option<String>,
    #[serde(flatten)]
    pub binding: EvidenceBinding,
}

impl StructureItem {
    fn describe(&self) -> String {
        let mut details = vec![if self.required { "Pflicht" } else { "optional" }.to_string()];
        if let Some(limit) = self.page_limit.filter(|limit| *limit > 0) {
            details.push(format!("max. {limit} Seiten"));
        }
        if let Some(format) = self
            .format_requirements
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            details.push(format!("Form: {format}"));
        }
        let prefix = self
            .order
            .map(|order| format!("{order}. "))
            .unwrap_or_default();
        format!("Gliederungspunkt {prefix}{} ({})", self.title.trim(), details.join("; "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfferStructureExtraction {
    #[serde(flatten)]
    pub overview: ExtractionOverview,
    pub structure: Vec<StructureItem>,
    #[serde(default)]
    pub formal_requirements: Vec<ClaimItem>,
    #[serde(default)]
    pub risks: Vec<ClaimItem>,
    #[serde(default)]
    pub open_questions: Vec<ClaimItem>,
    #[serde(default)]
    pub next_steps: Vec<ClaimItem>,
}

impl ExtractionContract for OfferStructureExtraction {
    fn validate(&self) -> Result<(), String> {
        self.overview.validate()?;
        if self.structure.iter().any(|item| item.title.trim().is_empty()) {
            return Err("structure item without title".to_string());
        }
        Ok(())
    }
}

impl SectionExtraction for OfferStructureExtraction {
    fn overview(&self) -> &ExtractionOverview {
        &self.overview
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfferStructureSection;

/// Items with an explicit order come first, ascending; the rest keep the
/// order in which they were extracted.
fn ordered_structure(items: &[StructureItem]) -> Vec<&StructureItem> {
    let mut ordered = items
        .iter()
        .filter(|item| !item.title.trim().is_empty())
        .collect::<Vec<_>>();
    ordered.sort_by_key(|item| item.order.unwrap_or(u32::MAX));
    ordered
}

fn structure_rows<'a>(
    section: SectionId,
    items: &'a [StructureItem],
    evidence: &EvidenceSet,
) -> Vec<(Option<&'a StructureItem>, CitedLine)> {
    let mut rows = ordered_structure(items)
        .into_iter()
        .map(|item| (Some(item), cite(section, item.describe(), &item.binding, evidence)))
        .collect::<Vec<_>>();
    if rows.is_empty() {
        rows.push((None, fallback_line(section, STRUCTURE_FALLBACK)));
    }
    rows
}

fn default_next_steps(structure_known: bool) -> Vec<CitedLine> {
    let mut steps = vec![];
    if structure_known {
        steps.push("Angebotsvorlage gemäß geforderter Gliederung anlegen");
        steps.push("Seitenbudgets je Gliederungspunkt an Autoren verteilen");
    } else {
        steps.push("Gliederungsvorgaben in den Vergabeunterlagen manuell ermitteln");
    }
    steps.push("Formale Vollständigkeitsprüfung vor Abgabe einplanen");
    steps
        .into_iter()
        .map(default_step_line)
        .collect()
}

impl SectionDefinition for OfferStructureSection {
    type Extraction = OfferStructureExtraction;

    fn id(&self) -> SectionId {
        SectionId::OfferStructure
    }

    fn queries(&self) -> &'static [&'static str] {
        prompts::OFFER_STRUCTURE_QUERIES
    }

    fn max_evidence(&self) -> usize {
        26
    }

    fn research_questions(&self) -> &'static [&'static str] {
        prompts::OFFER_STRUCTURE_RESEARCH_QUESTIONS
    }

    fn bounds(&self) -> FindingBounds {
        FindingBounds { min: 10, max: 20 }
    }

    fn system_prompt(&self) -> String {
        prompts::offer_structure_system_prompt()
    }

    fn padding_subjects(&self) -> &'static [&'static str] {
        &[
            "Geforderte Gliederung und Reihenfolge",
            "Seitenbegrenzungen je Kapitel",
            "Schriftart, Schriftgröße und Seitenränder",
            "Zulässige Dateiformate und Dateigrößen",
            "Signatur- und Textformerfordernisse",
            "Bezeichnung und Benennung der Dateien",
            "Zuordnung zu Zuschlagskriterien",
            "Anlagen und Formblätter",
            "Sprache der Angebotsunterlagen",
            "Einreichungsweg über die Vergabeplattform",
        ]
    }

    fn fallback_highlights(&self) -> Vec<String> {
        vec!["Angebotsstruktur: Gliederungsvorgaben manuell prüfen".to_string()]
    }

    fn assemble(&self, input: &AssemblyInput<'_, OfferStructureExtraction>) -> AppResult<AssembledSection> {
        let section = self.id();
        let extraction = input.extraction;
        let overview = extraction.map(SectionExtraction::overview);

        let structure = structure_rows(
            section,
            extraction.map(|e| e.structure.as_slice()).unwrap_or(&[]),
            input.evidence,
        );
        let structure_known = structure.iter().any(|(item, _)| item.is_some());
        let formal = claim_lines(
            section,
            extraction.map(|e| e.formal_requirements.as_slice()).unwrap_or(&[]),
            input.evidence,
            FORMAL_FALLBACK,
        );
        let risks = claim_lines(
            section,
            extraction.map(|e| e.risks.as_slice()).unwrap_or(&[]),
            input.evidence,
            RISKS_FALLBACK,
        );
        let questions = claim_lines(
            section,
            extraction.map(|e| e.open_questions.as_slice()).unwrap_or(&[]),
            input.evidence,
            QUESTIONS_FALLBACK,
        );
        let mut next_steps = cited_claims(
            section,
            extraction.map(|e| e.next_steps.as_slice()).unwrap_or(&[]),
            input.evidence,
        );
        if next_steps.is_empty() {
            next_steps = default_next_steps(structure_known);
        }

        let summary = summary_text(section, overview);
        let mut builder = TreeBuilder::new();
        let summary_id = add_summary_card(&mut builder, section, &summary, input.confidence, input.degraded());

        let rows = structure
            .iter()
            .enumerate()
            .map(|(idx, (item, line))| {
                json!({
                    "position": item.and_then(|item| item.order).unwrap_or(idx as u32 + 1),
                    "title": item.map(|item| item.title.trim().to_string()).unwrap_or_else(|| line.text.clone()),
                    "required": item.map(|item| item.required),
                    "pageLimit": item.and_then(|item| item.page_limit),
                    "formatRequirements": item.and_then(|item| item.format_requirements.clone()),
                    "needsManualReview": line.needs_review,
                    "sources": line.sources,
                })
            })
            .collect::<Vec<_>>();
        let table_id = builder.add(
            "structure-table",
            ElementType::Table,
            json!({
                "columns": [
                    {"key": "position", "label": "Nr."},
                    {"key": "title", "label": "Gliederungspunkt"},
                    {"key": "required", "label": "Pflicht"},
                    {"key": "pageLimit", "label": "Seiten"},
                    {"key": "formatRequirements", "label": "Formvorgaben"}
                ],
                "rows": rows,
            }),
            vec![],
        );
        let structure_id = builder.add(
            "structure",
            ElementType::Card,
            json!({"title": "Geforderte Gliederung"}),
            vec![table_id],
        );
        let formal_id = add_list_card(&mut builder, "formal-requirements", "Formale Anforderungen", &formal.lines);
        let risks_id = add_list_card(&mut builder, "risks", "Risiken", &risks.lines);
        let questions_id = add_list_card(&mut builder, "questions", "Offene Fragen", &questions.lines);
        let next_steps_id = add_list_card(&mut builder, "next-steps", "Nächste Schritte", &next_steps);
        builder.add(
            "root",
            ElementType::Section,
            json!({"title": section.label(), "scopeId": input.scope_id}),
            vec![summary_id, structure_id, formal_id, risks_id, questions_id, next_steps_id],
        );
        let visualization = builder.build("root")?;

        let mut findings = structure
            .iter()
            .map(|(item, line)| {
                let kind = if item.is_some() {
                    FindingKind::StructureItem
                } else {
                    FindingKind::ManualCheck
                };
                FindingDraft::from_line(line, FindingCategory::Fact, kind)
            })
            .collect::<Vec<_>>();
        findings.extend(formal.drafts(FindingCategory::Fact, FindingKind::FormalRequirement));
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

#[cfg(test)]
mod tests {
    use super::{ordered_structure, StructureItem};
    use crate::evidence::binding::EvidenceBinding;

    fn item(title: &str, order: Option<u32>) -> StructureItem {
        StructureItem {
            title: title.to_string(),
            required: true,
            order,
            page_limit: None,
            format_requirements: None,
            binding: EvidenceBinding::NeedsReview,
        }
    }

    #[test]
    fn explicit_order_wins_and_unordered_items_keep_position() {
        let items = vec![item("C", None), item("B", Some(2)), item("A", Some(1)), item("D", None)];
        let titles = ordered_structure(&items)
            .into_iter()
            .map(|item| item.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["A", "B", "C", "D"]);
    }
}
