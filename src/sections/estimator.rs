use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::errors::{AppError, AppResult};

const MANDATORY_MULTIPLIER: f64 = 1.25;
const HOURS_PER_PERSON_DAY: f64 = 8.0;
/// Effective hours one person spends on bid work per calendar day.
const EFFECTIVE_HOURS_PER_DAY: u32 = 6;
const PESSIMISTIC_FACTOR: f64 = 1.3;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableCategory {
    ProposalDocument,
    Commercial,
    Legal,
    Technical,
    Reference,
    Administrative,
    Presentation,
}

impl DeliverableCategory {
    pub const ALL: [DeliverableCategory; 7] = [
        Self::ProposalDocument,
        Self::Commercial,
        Self::Legal,
        Self::Technical,
        Self::Reference,
        Self::Administrative,
        Self::Presentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalDocument => "proposal_document",
            Self::Commercial => "commercial",
            Self::Legal => "legal",
            Self::Technical => "technical",
            Self::Reference => "reference",
            Self::Administrative => "administrative",
            Self::Presentation => "presentation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ProposalDocument => "Angebotsdokument",
            Self::Commercial => "Kommerziell",
            Self::Legal => "Rechtlich",
            Self::Technical => "Technisch",
            Self::Reference => "Referenzen",
            Self::Administrative => "Formalien",
            Self::Presentation => "Präsentation",
        }
    }

    pub fn base_hours(&self) -> f64 {
        match self {
            Self::ProposalDocument => 24.0,
            Self::Commercial => 16.0,
            Self::Legal => 8.0,
            Self::Technical => 32.0,
            Self::Reference => 6.0,
            Self::Administrative => 3.0,
            Self::Presentation => 12.0,
        }
    }

    /// `(task, discipline, share in percent)`; shares sum to 100.
    fn wbs_template(&self) -> &'static [(&'static str, &'static str, u32)] {
        match self {
            Self::ProposalDocument => &[
                ("Gliederung und Anforderungsabgleich", "Bid Management", 20),
                ("Inhaltliche Ausarbeitung", "Fachbereich", 50),
                ("Review und Qualitätssicherung", "Bid Management", 20),
                ("Layout und Finalisierung", "Backoffice", 10),
            ],
            Self::Commercial => &[
                ("Mengengerüst und Kalkulation", "Vertrieb", 50),
                ("Preisblatt ausfüllen", "Vertrieb", 30),
                ("Freigabe Geschäftsleitung", "Management", 20),
            ],
            Self::Legal => &[
                ("Vertrags- und AGB-Prüfung", "Recht", 60),
                ("Erklärungen und Nachweise", "Backoffice", 40),
            ],
            Self::Technical => &[
                ("Lösungskonzept", "Architektur", 40),
                ("Umsetzungs- und Betriebskonzept", "Fachbereich", 35),
                ("Technisches Review", "Architektur", 15),
                ("Finalisierung", "Bid Management", 10),
            ],
            Self::Reference => &[
                ("Referenzen auswählen und abstimmen", "Vertrieb", 60),
                ("Referenzblätter erstellen", "Backoffice", 40),
            ],
            Self::Administrative => &[
                ("Formulare und Eigenerklärungen", "Backoffice", 70),
                ("Vollständigkeitsprüfung", "Bid Management", 30),
            ],
            Self::Presentation => &[
                ("Foliensatz erstellen", "Fachbereich", 60),
                ("Probedurchlauf", "Bid Management", 40),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableInput {
    pub name: String,
    pub category: String,
    pub mandatory: bool,
    #[serde(default)]
    pub page_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WbsRow {
    pub task: String,
    pub discipline: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableEstimate {
    pub name: String,
    pub category: DeliverableCategory,
    pub mandatory: bool,
    pub page_limit: Option<u32>,
    pub effort_hours: f64,
    #[serde(rename = "effortPT")]
    pub effort_pt: f64,
    pub calendar_days: u32,
    pub wbs: Vec<WbsRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimateTotals {
    pub deliverable_count: usize,
    pub effort_hours: f64,
    #[serde(rename = "effortPT")]
    pub effort_pt: f64,
    pub calendar_days: u32,
    pub pessimistic_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EstimateAssumption {
    pub label: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResult {
    pub per_deliverable: Vec<DeliverableEstimate>,
    pub totals: EstimateTotals,
    pub assumptions: Vec<EstimateAssumption>,
    pub parallelization_hints: Vec<String>,
}

impl EstimateResult {
    pub fn get(&self, name: &str) -> Option<&DeliverableEstimate> {
        self.per_deliverable.iter().find(|row| row.name == name)
    }
}

fn page_limit_factor(page_limit: Option<u32>) -> f64 {
    match page_limit {
        None | Some(0) => 1.0,
        Some(1..=5) => 0.6,
        Some(6..=15) => 0.8,
        Some(16..=40) => 0.9,
        Some(_) => 1.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn half_units_to_hours(units: u32) -> f64 {
    f64::from(units) / 2.0
}

fn calendar_days(half_units: u32) -> u32 {
    half_units.div_ceil(EFFECTIVE_HOURS_PER_DAY * 2)
}

/// Hours for one deliverable in half-hour units, at least one unit.
fn deliverable_half_units(category: DeliverableCategory, mandatory: bool, page_limit: Option<u32>) -> u32 {
    let mut hours = category.base_hours() * page_limit_factor(page_limit);
    if mandatory {
        hours *= MANDATORY_MULTIPLIER;
    }
    ((hours * 2.0).round() as u32).max(1)
}

fn build_wbs(category: DeliverableCategory, half_units: u32) -> Vec<WbsRow> {
    let template = category.wbs_template();
    let mut remaining = half_units;
    template
        .iter()
        .enumerate()
        .map(|(idx, (task, discipline, share))| {
            let units = if idx + 1 == template.len() {
                remaining
            } else {
                (half_units * share / 100).min(remaining)
            };
            remaining -= units;
            WbsRow {
                task: (*task).to_string(),
                discipline: (*discipline).to_string(),
                hours: half_units_to_hours(units),
            }
        })
        .collect()
}

fn assumptions() -> Vec<EstimateAssumption> {
    let base = DeliverableCategory::ALL
        .iter()
        .map(|category| format!("{} {} h", category.label(), category.base_hours()))
        .collect::<Vec<_>>()
        .join(", ");
    [
        ("Basisaufwand je Kategorie", base),
        (
            "Pflichtbestandteile",
            format!("Pflichtbestandteile werden mit Faktor {MANDATORY_MULTIPLIER} bewertet."),
        ),
        (
            "Seitenbegrenzung",
            "1–5 Seiten ×0,6; 6–15 Seiten ×0,8; 16–40 Seiten ×0,9; darüber oder ohne Vorgabe ×1,0."
                .to_string(),
        ),
        (
            "Kalenderdauer",
            format!(
                "Ein Bearbeiter mit {EFFECTIVE_HOURS_PER_DAY} effektiven Stunden pro Tag, sequenziell ohne Parallelisierung."
            ),
        ),
        (
            "Personentage",
            format!("1 PT = {HOURS_PER_PERSON_DAY} Stunden."),
        ),
        (
            "Rundung",
            "Stunden je Bestandteil auf halbe Stunden gerundet, mindestens 0,5 h.".to_string(),
        ),
        (
            "Pessimistischer Wert",
            format!("Gesamtstunden ×{PESSIMISTIC_FACTOR} als obere Bandbreite."),
        ),
    ]
    .into_iter()
    .map(|(label, rationale)| EstimateAssumption {
        label: label.to_string(),
        rationale,
    })
    .collect()
}

fn parallelization_hints(rows: &[DeliverableEstimate], totals: &EstimateTotals) -> Vec<String> {
    let has = |category: DeliverableCategory| rows.iter().any(|row| row.category == category);
    let mut hints = vec![];
    if (has(DeliverableCategory::Legal) || has(DeliverableCategory::Administrative))
        && (has(DeliverableCategory::Technical) || has(DeliverableCategory::ProposalDocument))
    {
        hints.push(
            "Rechtliche und formale Unterlagen können parallel zu den inhaltlichen Beiträgen vorbereitet werden."
                .to_string(),
        );
    }
    if has(DeliverableCategory::Commercial) && has(DeliverableCategory::Technical) {
        hints.push(
            "Kalkulation parallel zum technischen Konzept beginnen, Preisblatt erst nach dessen Abschluss finalisieren."
                .to_string(),
        );
    }
    if has(DeliverableCategory::Reference) {
        hints.push(
            "Referenzfreigaben früh bei den Kunden anfragen; sie brauchen Vorlauf unabhängig vom übrigen Angebot."
                .to_string(),
        );
    }
    if has(DeliverableCategory::Presentation) {
        hints.push(
            "Präsentation nach Fertigstellung der schriftlichen Unterlagen erstellen und einen Probedurchlauf einplanen."
                .to_string(),
        );
    }
    if rows.len() > 1 && totals.calendar_days > 10 {
        hints.push(format!(
            "Mit mehreren Bearbeitern verkürzt sich die Kalenderdauer von {} Tagen; der Wert bleibt als konservative Einzelbearbeiter-Schätzung stehen.",
            totals.calendar_days
        ));
    }
    hints
}

/// Deterministic effort estimate for the extracted deliverables. Unknown
/// categories are rejected rather than defaulted.
pub fn estimate_bid_deliverables_effort(items: &[DeliverableInput]) -> AppResult<EstimateResult> {
    let mut rows = Vec::with_capacity(items.len());
    let mut total_units = 0u32;

    for item in items {
        let category = DeliverableCategory::parse(&item.category).ok_or_else(|| {
            AppError::EstimationInputInvalid(format!(
                "unknown deliverable category '{}' for '{}'",
                item.category, item.name
            ))
        })?;
        let units = deliverable_half_units(category, item.mandatory, item.page_limit);
        total_units += units;
        let hours = half_units_to_hours(units);
        rows.push(DeliverableEstimate {
            name: item.name.clone(),
            category,
            mandatory: item.mandatory,
            page_limit: item.page_limit.filter(|limit| *limit > 0),
            effort_hours: hours,
            effort_pt: round1(hours / HOURS_PER_PERSON_DAY),
            calendar_days: calendar_days(units),
            wbs: build_wbs(category, units),
        });
    }

    if rows.is_empty() {
        return Ok(EstimateResult {
            assumptions: assumptions(),
            ..EstimateResult::default()
        });
    }

    let total_hours = half_units_to_hours(total_units);
    let totals = EstimateTotals {
        deliverable_count: rows.len(),
        effort_hours: total_hours,
        effort_pt: round1(total_hours / HOURS_PER_PERSON_DAY),
        calendar_days: calendar_days(total_units),
        pessimistic_hours: round1(total_hours * PESSIMISTIC_FACTOR),
    };
    let parallelization_hints = parallelization_hints(&rows, &totals);

    Ok(EstimateResult {
        per_deliverable: rows,
        totals,
        assumptions: assumptions(),
        parallelization_hints,
    })
}

/// Markdown breakdown grouped by category with subtotals.
pub fn render_estimate_markdown(estimate: &EstimateResult) -> String {
    if estimate.per_deliverable.is_empty() {
        return "Keine Bestandteile für eine Aufwandsschätzung erkannt.".to_string();
    }

    let mut groups: BTreeMap<DeliverableCategory, Vec<&DeliverableEstimate>> = BTreeMap::new();
    for row in &estimate.per_deliverable {
        groups.entry(row.category).or_default().push(row);
    }

    let mut out = String::from(
        "| Kategorie | Bestandteil | Pflicht | Stunden | PT | Kalendertage |\n|---|---|---|---:|---:|---:|\n",
    );
    for (category, rows) in &groups {
        for row in rows {
            out.push_str(&format!(
                "| {} | {} | {} | {:.1} | {:.1} | {} |\n",
                category.label(),
                row.name.replace('|', "/"),
                if row.mandatory { "ja" } else { "nein" },
                row.effort_hours,
                row.effort_pt,
                row.calendar_days
            ));
        }
        let subtotal: f64 = rows.iter().map(|row| row.effort_hours).sum();
        out.push_str(&format!(
            "| **Summe {}** | | | **{:.1}** | **{:.1}** | |\n",
            category.label(),
            subtotal,
            round1(subtotal / HOURS_PER_PERSON_DAY)
        ));
    }

    let totals = &estimate.totals;
    out.push_str(&format!(
        "\n**Gesamt:** {:.1} h ({:.1} PT, {} Kalendertage bei einem Bearbeiter), pessimistisch {:.1} h\n",
        totals.effort_hours, totals.effort_pt, totals.calendar_days, totals.pessimistic_hours
    ));
    out
}
